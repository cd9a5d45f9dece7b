//! Integration tests: full flows against a simulated G502-class device.
//!
//! The simulated device keeps sixteen 256-byte flash pages and answers the
//! root, feature-set, device-name and onboard-profiles features, so these
//! tests drive the same read→decode→export→import→save pipeline the CLI uses.

#[cfg(test)]
mod tests {
    use crate::buttons::ButtonAction;
    use crate::config::SessionConfig;
    use crate::document::{self, KeymapDocument, ProfileDocument};
    use crate::error::Error;
    use crate::feature::FeatureClient;
    use crate::macros::PageMap;
    use crate::onboard::{OnboardProfiles, SlotChange};
    use crate::profile;
    use crate::transport::mock::{SimulatedDevice, SIM_NAME};
    use std::sync::Arc;

    fn g502() -> Arc<SimulatedDevice> {
        Arc::new(SimulatedDevice::new(5, 11, 16, 256))
    }

    fn open(sim: &Arc<SimulatedDevice>) -> OnboardProfiles {
        let client = FeatureClient::from_config(Box::new(Arc::clone(sim)), &SessionConfig::default());
        OnboardProfiles::open(client, None).unwrap()
    }

    fn export_profile(session: &mut OnboardProfiles, profile: u8) -> ProfileDocument {
        let page = session.load_profile_page(profile).unwrap();
        let geometry = session.geometry();
        let record = profile::decode(&page, &geometry).unwrap();
        document::export(&record, &geometry, session).unwrap()
    }

    fn import_profile(session: &mut OnboardProfiles, profile: u8, doc: &ProfileDocument) {
        let overflow = session.layout().overflow_pages(profile).to_vec();
        let image = document::import(doc, &session.geometry(), &overflow).unwrap();
        session.save_profile(profile, &image).unwrap();
    }

    /// Export, edit, import and save, then read everything back in a new session.
    #[test]
    fn edit_profile_with_macro() {
        let sim = g502();
        let mut session = open(&sim);

        let mut doc = export_profile(&mut session, 2);
        assert_eq!(doc.profile_name, "Profile 2");
        doc.profile_name = "Edited".into();
        doc.dpi_list = vec![800, 1200, 1600, 2400, 3200];
        doc.buttons[5] = KeymapDocument::Macro {
            value: "+lctrl c -lctrl sleep(20) +lctrl v -lctrl".into(),
            bytes: None,
        };
        doc.buttons[6] = KeymapDocument::Button {
            value: ButtonAction::DpiCycle,
        };
        import_profile(&mut session, 2, &doc);

        // profile 2 owns pages 2, 8 and 9
        assert_eq!(sim.commits(), vec![2, 8]);

        let mut reopened = open(&sim);
        let back = export_profile(&mut reopened, 2);
        assert_eq!(back.profile_name, "Edited");
        assert_eq!(back.dpi_list, vec![800, 1200, 1600, 2400, 3200]);
        assert_eq!(
            back.buttons[5],
            KeymapDocument::Macro {
                value: "+lctrl c -lctrl sleep(20) +lctrl v -lctrl".into(),
                bytes: Some("\\x00\\x08\\x00\\x00".into()),
            }
        );
        assert_eq!(
            back.buttons[6],
            KeymapDocument::Button {
                value: ButtonAction::DpiCycle
            }
        );

        // untouched neighbours
        assert_eq!(export_profile(&mut reopened, 1).profile_name, "Profile 1");
    }

    #[test]
    fn macro_spanning_two_pages() {
        let sim = g502();
        let mut session = open(&sim);

        let text = vec!["a"; 60].join(" ");
        let mut doc = export_profile(&mut session, 1);
        doc.buttons[2] = KeymapDocument::Macro {
            value: text.clone(),
            bytes: None,
        };
        import_profile(&mut session, 1, &doc);
        assert_eq!(sim.commits(), vec![1, 6, 7]);

        let back = export_profile(&mut open(&sim), 1);
        match &back.buttons[2] {
            KeymapDocument::Macro { value, .. } => assert_eq!(value, &text),
            other => panic!("expected macro, got {other:?}"),
        }
    }

    #[test]
    fn macro_too_large_writes_nothing() {
        let sim = g502();
        let mut session = open(&sim);

        let mut doc = export_profile(&mut session, 3);
        doc.buttons[4] = KeymapDocument::Macro {
            value: vec!["a"; 200].join(" "),
            bytes: None,
        };
        let overflow = session.layout().overflow_pages(3).to_vec();
        let result = document::import(&doc, &session.geometry(), &overflow);
        assert!(matches!(result, Err(Error::MacroTooLarge { .. })));
        assert!(sim.commits().is_empty());
    }

    #[test]
    fn document_survives_json() {
        let sim = g502();
        let mut session = open(&sim);
        let stored = sim.page(4);

        let json = export_profile(&mut session, 4).to_json().unwrap();
        let doc = ProfileDocument::from_json(&json).unwrap();
        import_profile(&mut session, 4, &doc);

        assert_eq!(sim.page(4), stored);
        assert_eq!(sim.commits(), vec![4]);
    }

    #[test]
    fn decode_saved_page_without_device() {
        let sim = g502();
        let saved = sim.page(3);
        let geometry = open(&sim).geometry();

        let record = profile::decode(&saved, &geometry).unwrap();
        let doc = document::export(&record, &geometry, &mut PageMap::new(256, 16, 5)).unwrap();
        assert_eq!(doc.profile_name, "Profile 3");
        assert_eq!(doc.report_rate, Some(1000));
    }

    #[test]
    fn directory_workflow() {
        let sim = g502();
        let mut session = open(&sim);
        assert_eq!(session.status_line().unwrap(), "1* 2 3 4 5");

        assert_eq!(session.set_profile_enabled(3, false).unwrap(), SlotChange::Applied);
        assert_eq!(session.set_profile_visibility(4, false).unwrap(), SlotChange::Applied);
        assert_eq!(session.status_line().unwrap(), "1* 2 3x 4- 5");

        // a disabled profile can be neither loaded nor selected
        assert!(matches!(
            session.load_profile_page(3),
            Err(Error::InvalidStateTransition(_))
        ));
        assert!(matches!(
            session.set_current_profile(3),
            Err(Error::InvalidStateTransition(_))
        ));

        // switching to a hidden profile shows it first
        assert_eq!(session.set_current_profile(4).unwrap(), SlotChange::Applied);
        assert_eq!(sim.current_profile(), 4);
        assert_eq!(session.status_line().unwrap(), "1 2 3x 4* 5");

        assert_eq!(session.set_profile_enabled(3, true).unwrap(), SlotChange::Applied);

        // the directory on flash matches what the session reports
        let mut fresh = open(&sim);
        assert_eq!(fresh.status_line().unwrap(), "1 2 3 4* 5");
    }

    #[test]
    fn onboard_mode_and_device_identity() {
        let sim = g502();
        let mut session = open(&sim);

        assert!(session.onboard_mode().unwrap());
        session.set_onboard_mode(false).unwrap();
        assert!(!session.onboard_mode().unwrap());
        assert_eq!(sim.onboard_mode(), 2);

        let client = session.client_mut();
        assert_eq!(client.device_name().unwrap(), SIM_NAME);
        assert_eq!(client.protocol_version().unwrap(), (4, 2));
    }

    #[test]
    fn config_layout_override_routes_macro_pages() {
        let sim = g502();
        let config = SessionConfig::from_json(
            r#"{ "page_layout": [[1, 15], [2, 14], [3, 13], [4, 12], [5, 11]] }"#,
        )
        .unwrap();
        let client = FeatureClient::from_config(Box::new(Arc::clone(&sim)), &config);
        let mut session = OnboardProfiles::open(client, config.page_layout.clone()).unwrap();
        assert_eq!(session.layout().overflow_pages(2), &[14]);

        let mut doc = export_profile(&mut session, 2);
        doc.buttons[7] = KeymapDocument::Macro {
            value: "btn(1) wheel(-3)".into(),
            bytes: None,
        };
        import_profile(&mut session, 2, &doc);
        assert_eq!(sim.commits(), vec![2, 14]);

        let back = export_profile(&mut session, 2);
        match &back.buttons[7] {
            KeymapDocument::Macro { value, .. } => assert_eq!(value, "btn(1) wheel(-3)"),
            other => panic!("expected macro, got {other:?}"),
        }
    }

    #[test]
    fn extended_report_rate_uses_extended_field() {
        let sim = g502();
        sim.set_extended_report_rate(true);
        let mut page = sim.page(1);
        // extended selector 3 = 1000 Hz
        page[0] = 3;
        crate::transport::mock::seal(&mut page);
        sim.set_page(1, page);

        let mut session = open(&sim);
        assert!(session.extended_report_rate());
        let doc = export_profile(&mut session, 1);
        assert_eq!(doc.report_rate, None);
        assert_eq!(doc.extended_report_rate, Some(1000));
    }

    #[test]
    fn corrupted_profile_page_is_reported() {
        let sim = g502();
        let mut page = sim.page(5);
        page[40] ^= 0x01;
        sim.set_page(5, page);

        let mut session = open(&sim);
        assert!(matches!(
            session.load_profile_page(5),
            Err(Error::ChecksumMismatch { page: 5, .. })
        ));
    }
}
