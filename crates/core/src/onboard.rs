//! Onboard profile memory via HID++ 2.0 ONBOARD_PROFILES feature (0x8100).
//!
//! HID++ 2.0 ONBOARD_PROFILES functions:
//!   - Function 0: getDescription → memory layout, formats, profile/button/page counts, page size
//!   - Function 1: setOnboardMode(mode) → 1=onboard, 2=host
//!   - Function 2: getOnboardMode → params[0]
//!   - Function 3: setCurrentProfile(0, profile, 0)
//!   - Function 4: getCurrentProfile → params[1]
//!   - Function 5: memoryRead(page, offset) → 16 bytes
//!   - Function 6: memoryWriteStart(page, offset, length)
//!   - Function 7: memoryWrite(16 bytes)
//!   - Function 8: memoryWriteEnd
//!
//! Page 0 is the profile directory, profile `n` lives on page `n`, and the
//! pages after the last profile hold macro bytecode. The directory and the
//! profile pages end with a CRC16-CCITT; macro pages do not.

use crate::checksum;
use crate::error::{Error, Result};
use crate::feature::FeatureClient;
use crate::hidpp::{features, MAX_PARAMS};
use crate::macros::PageSource;
use crate::profile::ProfileGeometry;
use tracing::{debug, info, warn};

const FN_GET_DESCRIPTION: u8 = 0x00;
const FN_SET_ONBOARD_MODE: u8 = 0x01;
const FN_GET_ONBOARD_MODE: u8 = 0x02;
const FN_SET_CURRENT_PROFILE: u8 = 0x03;
const FN_GET_CURRENT_PROFILE: u8 = 0x04;
const FN_MEMORY_READ: u8 = 0x05;
const FN_MEMORY_WRITE_START: u8 = 0x06;
const FN_MEMORY_WRITE: u8 = 0x07;
const FN_MEMORY_WRITE_END: u8 = 0x08;

/// Directory page index.
pub const DIRECTORY_PAGE: u16 = 0;

/// Bytes per directory entry.
pub const DIRECTORY_ENTRY_LEN: usize = 4;

/// Bytes moved by one memory read or write call.
pub const CHUNK_LEN: usize = MAX_PARAMS;

/// Page sizes the memory layout supports.
pub const SUPPORTED_PAGE_SIZES: [u16; 2] = [256, 1024];

/// Highest profile binary format understood.
pub const MAX_PROFILE_FORMAT: u8 = 5;

/// Most buttons a profile page has room for.
pub const MAX_BUTTONS: u8 = 16;

const MARKER_ENABLED: u8 = 0x00;
const MARKER_ROM: u8 = 0x01;
const MARKER_DISABLED: u8 = 0xFF;

/// Onboard mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardMode {
    /// Mouse uses its stored profiles.
    Onboard = 1,
    /// Host software controls settings.
    Host = 2,
}

impl OnboardMode {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Onboard),
            2 => Some(Self::Host),
            _ => None,
        }
    }
}

/// Capability fields from getDescription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDescription {
    pub memory_layout: u8,
    pub profile_format: u8,
    pub macro_format: u8,
    pub profile_count: u8,
    pub profile_count_oob: u8,
    pub button_count: u8,
    pub page_count: u16,
    pub page_size: u16,
    pub gshift_flags: u8,
}

impl MemoryDescription {
    /// Parse and validate a getDescription reply.
    ///
    /// Fails with [`Error::UnsupportedDevice`] for anything outside the
    /// supported memory layout.
    pub fn parse(params: &[u8]) -> Result<Self> {
        if params.len() < 10 {
            return Err(Error::Hid(format!(
                "onboard description too short: {} bytes",
                params.len()
            )));
        }

        let desc = Self {
            memory_layout: params[0],
            profile_format: params[1],
            macro_format: params[2],
            profile_count: params[3],
            profile_count_oob: params[4],
            button_count: params[5],
            page_count: params[6] as u16,
            page_size: u16::from_be_bytes([params[7], params[8]]),
            gshift_flags: params[9],
        };

        if desc.memory_layout != 1 {
            return Err(Error::UnsupportedDevice(format!(
                "memory layout {}",
                desc.memory_layout
            )));
        }
        if desc.profile_format > MAX_PROFILE_FORMAT {
            return Err(Error::UnsupportedDevice(format!(
                "profile format {}",
                desc.profile_format
            )));
        }
        if desc.macro_format != 1 {
            return Err(Error::UnsupportedDevice(format!(
                "macro format {}",
                desc.macro_format
            )));
        }
        if desc.button_count > MAX_BUTTONS {
            return Err(Error::UnsupportedDevice(format!(
                "{} buttons (at most {MAX_BUTTONS})",
                desc.button_count
            )));
        }
        if !SUPPORTED_PAGE_SIZES.contains(&desc.page_size) {
            return Err(Error::UnsupportedDevice(format!(
                "page size {} (expected 256 or 1024)",
                desc.page_size
            )));
        }
        if desc.profile_count == 0 || desc.page_count <= desc.profile_count as u16 {
            return Err(Error::UnsupportedDevice(format!(
                "{} profiles in {} pages",
                desc.profile_count, desc.page_count
            )));
        }

        Ok(desc)
    }

    /// Buttons on the shift layer: all of them when present, else none.
    pub fn gshift_button_count(&self) -> u8 {
        if self.gshift_flags & 0x03 == 0x02 {
            self.button_count
        } else {
            0
        }
    }
}

/// Where a directory slot's profile lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPage {
    Page(u16),
    Disabled,
    OnRom,
}

/// One directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSlot {
    pub assigned_page: SlotPage,
    pub visible: bool,
}

impl ProfileSlot {
    pub fn is_enabled(&self) -> bool {
        matches!(self.assigned_page, SlotPage::Page(_))
    }

    /// The 4 directory bytes for this slot when held by profile `profile`.
    fn to_entry(self, profile: u8) -> [u8; DIRECTORY_ENTRY_LEN] {
        match self.assigned_page {
            SlotPage::Page(_) => [MARKER_ENABLED, profile, u8::from(self.visible), 0x00],
            SlotPage::OnRom => [MARKER_ROM, 0xFF, u8::from(self.visible), 0x00],
            SlotPage::Disabled => [MARKER_DISABLED; DIRECTORY_ENTRY_LEN],
        }
    }
}

/// Profile directory read from page 0, one slot per profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDirectory {
    slots: Vec<ProfileSlot>,
}

impl ProfileDirectory {
    /// Decode the first `profile_count` entries of a directory page.
    ///
    /// An enabled entry must point at the page numbered like its profile.
    pub fn parse(page: &[u8], profile_count: u8) -> Result<Self> {
        let needed = profile_count as usize * DIRECTORY_ENTRY_LEN;
        if page.len() < needed {
            return Err(Error::WrongPageSize {
                expected: needed,
                actual: page.len(),
            });
        }

        let mut slots = Vec::with_capacity(profile_count as usize);
        for (i, entry) in page[..needed].chunks(DIRECTORY_ENTRY_LEN).enumerate() {
            let profile = i as u8 + 1;
            let visible = entry[2] == 1;
            let assigned_page = match entry[0] {
                MARKER_DISABLED => {
                    debug!(profile, "Profile slot disabled");
                    SlotPage::Disabled
                }
                MARKER_ROM => {
                    debug!(profile, "Profile slot on ROM");
                    SlotPage::OnRom
                }
                MARKER_ENABLED if entry[1] == profile => SlotPage::Page(entry[1] as u16),
                marker => {
                    return Err(Error::UnsupportedDevice(format!(
                        "directory entry for profile {profile} is {marker:02X} {:02X}, expected page {profile}",
                        entry[1]
                    )));
                }
            };
            slots.push(ProfileSlot {
                assigned_page,
                visible: visible && assigned_page != SlotPage::Disabled,
            });
        }

        Ok(Self { slots })
    }

    /// Slot of 1-based `profile`.
    pub fn slot(&self, profile: u8) -> Option<&ProfileSlot> {
        self.slots.get((profile as usize).checked_sub(1)?)
    }

    fn slot_mut(&mut self, profile: u8) -> Option<&mut ProfileSlot> {
        self.slots.get_mut((profile as usize).checked_sub(1)?)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `(profile, slot)` pairs in directory order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &ProfileSlot)> {
        self.slots.iter().enumerate().map(|(i, s)| (i as u8 + 1, s))
    }

    /// Byte offset of `profile`'s entry in the directory page.
    pub fn entry_offset(profile: u8) -> usize {
        (profile as usize).saturating_sub(1) * DIRECTORY_ENTRY_LEN
    }
}

/// Pages assigned to each profile: `[primary, overflow...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    plans: Vec<Vec<u16>>,
}

impl PageLayout {
    /// Primary page `n` for profile `n`; the pages after the last profile are
    /// shared out evenly as macro overflow, leftovers unused.
    pub fn compute(page_count: u16, profile_count: u8) -> Self {
        let profiles = profile_count as u16;
        let overflow = if profiles == 0 {
            0
        } else {
            page_count.saturating_sub(profiles + 1) / profiles
        };

        let plans = (0..profiles)
            .map(|i| {
                let first = profiles + i * overflow + 1;
                std::iter::once(i + 1)
                    .chain(first..first + overflow)
                    .collect()
            })
            .collect::<Vec<Vec<u16>>>();

        debug!(page_count, profile_count, overflow, "Computed page layout");
        Self { plans }
    }

    /// Use an explicit table instead of the computed plan.
    pub fn from_table(table: Vec<Vec<u16>>, page_count: u16, profile_count: u8) -> Result<Self> {
        if table.len() != profile_count as usize {
            return Err(Error::WrongFieldSize {
                field: "page_layout",
                expected: profile_count as usize,
                actual: table.len(),
            });
        }
        for plan in &table {
            if plan.is_empty() {
                return Err(Error::WrongFieldSize {
                    field: "page_layout entry",
                    expected: 1,
                    actual: 0,
                });
            }
            if let Some(&page) = plan
                .iter()
                .find(|&&page| page == DIRECTORY_PAGE || page >= page_count)
            {
                return Err(Error::OutOfRange {
                    field: "page_layout page",
                    value: page as u32,
                    min: 1,
                    max: page_count as u32 - 1,
                });
            }
        }
        debug!(?table, "Using page layout override");
        Ok(Self { plans: table })
    }

    /// Full plan for 1-based `profile`.
    pub fn plan(&self, profile: u8) -> Option<&[u16]> {
        self.plans
            .get((profile as usize).checked_sub(1)?)
            .map(Vec::as_slice)
    }

    pub fn primary_page(&self, profile: u8) -> Option<u16> {
        self.plan(profile).and_then(|plan| plan.first().copied())
    }

    /// Macro pages of `profile`, in fill order.
    pub fn overflow_pages(&self, profile: u8) -> &[u16] {
        self.plan(profile).map(|plan| &plan[1..]).unwrap_or(&[])
    }

    pub fn profile_count(&self) -> usize {
        self.plans.len()
    }
}

/// Outcome of a directory or profile operation that may have nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    Applied,
    Unchanged,
}

/// Page set for one profile: its primary page plus macro pages at explicit addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileImage {
    pub profile_page: Vec<u8>,
    pub macro_pages: Vec<(u16, Vec<u8>)>,
}

/// Onboard memory session: capabilities, directory and page layout of one device.
pub struct OnboardProfiles {
    client: FeatureClient,
    description: MemoryDescription,
    extended_report_rate: bool,
    directory: ProfileDirectory,
    layout: PageLayout,
}

impl OnboardProfiles {
    /// Read the capability fields and the directory.
    ///
    /// `layout_override` replaces the computed page layout.
    pub fn open(mut client: FeatureClient, layout_override: Option<Vec<Vec<u16>>>) -> Result<Self> {
        if !client.has_feature(features::ONBOARD_PROFILES)? {
            return Err(Error::UnsupportedDevice("no onboard profiles".into()));
        }

        let params = client.call(features::ONBOARD_PROFILES, FN_GET_DESCRIPTION, &[0x00])?;
        let description = MemoryDescription::parse(&params)?;
        let extended_report_rate = client.has_feature(features::EXTENDED_REPORT_RATE)?;
        info!(
            profiles = description.profile_count,
            buttons = description.button_count,
            pages = description.page_count,
            page_size = description.page_size,
            profile_format = description.profile_format,
            extended_report_rate,
            "Onboard memory opened"
        );

        let layout = match layout_override {
            Some(table) => {
                PageLayout::from_table(table, description.page_count, description.profile_count)?
            }
            None => PageLayout::compute(description.page_count, description.profile_count),
        };

        let mut session = Self {
            client,
            directory: ProfileDirectory { slots: Vec::new() },
            description,
            extended_report_rate,
            layout,
        };
        let page = session.read_page(DIRECTORY_PAGE, true)?;
        session.directory = ProfileDirectory::parse(&page, session.description.profile_count)?;
        Ok(session)
    }

    pub fn description(&self) -> &MemoryDescription {
        &self.description
    }

    pub fn extended_report_rate(&self) -> bool {
        self.extended_report_rate
    }

    pub fn directory(&self) -> &ProfileDirectory {
        &self.directory
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Feature client for calls outside the onboard feature.
    pub fn client_mut(&mut self) -> &mut FeatureClient {
        &mut self.client
    }

    /// Field geometry of this device's profile pages.
    pub fn geometry(&self) -> ProfileGeometry {
        ProfileGeometry {
            button_count: self.description.button_count as usize,
            gshift_button_count: self.description.gshift_button_count() as usize,
            page_size: self.description.page_size as usize,
            extended_report_rate: self.extended_report_rate,
        }
    }

    pub fn page_size(&self) -> usize {
        self.description.page_size as usize
    }

    fn check_page(&self, page: u16) -> Result<()> {
        if page >= self.description.page_count {
            return Err(Error::OutOfRange {
                field: "page",
                value: page as u32,
                min: 0,
                max: self.description.page_count as u32 - 1,
            });
        }
        Ok(())
    }

    fn check_profile(&self, profile: u8) -> Result<()> {
        if profile == 0 || profile > self.description.profile_count {
            return Err(Error::OutOfRange {
                field: "profile",
                value: profile as u32,
                min: 1,
                max: self.description.profile_count as u32,
            });
        }
        Ok(())
    }

    /// Read a whole page, 16 bytes per call.
    ///
    /// With `verify`, the trailing checksum must match the content.
    pub fn read_page(&mut self, page: u16, verify: bool) -> Result<Vec<u8>> {
        self.check_page(page)?;
        let size = self.page_size();
        let mut data = Vec::with_capacity(size);
        for offset in (0..size).step_by(CHUNK_LEN) {
            let mut params = page.to_be_bytes().to_vec();
            params.extend_from_slice(&(offset as u16).to_be_bytes());
            let chunk = self
                .client
                .call(features::ONBOARD_PROFILES, FN_MEMORY_READ, &params)?;
            if chunk.len() < CHUNK_LEN {
                return Err(Error::Hid(format!(
                    "memory read of page {page} offset {offset} returned {} bytes",
                    chunk.len()
                )));
            }
            data.extend_from_slice(&chunk[..CHUNK_LEN]);
        }

        if verify {
            if let Some((stored, computed)) = checksum::split_checksum(&data) {
                if stored != computed {
                    return Err(Error::ChecksumMismatch {
                        page,
                        stored,
                        computed,
                    });
                }
            }
        }

        debug!(page, verify, len = data.len(), "Read memory page");
        Ok(data)
    }

    /// Write a whole page: start, 16-byte chunks, end.
    ///
    /// With `verify`, the last two bytes are replaced by the page checksum.
    pub fn write_page(&mut self, page: u16, data: &[u8], verify: bool) -> Result<()> {
        let size = self.page_size();
        if data.len() != size {
            return Err(Error::WrongPageSize {
                expected: size,
                actual: data.len(),
            });
        }
        self.check_page(page)?;

        let mut data = data.to_vec();
        if verify {
            let crc = checksum::crc16_ccitt(&data[..size - 2]);
            data[size - 2..].copy_from_slice(&crc.to_be_bytes());
        }

        let mut start = page.to_be_bytes().to_vec();
        start.extend_from_slice(&[0x00, 0x00]);
        start.extend_from_slice(&(size as u16).to_be_bytes());
        self.client
            .call(features::ONBOARD_PROFILES, FN_MEMORY_WRITE_START, &start)?;
        for chunk in data.chunks(CHUNK_LEN) {
            self.client
                .call(features::ONBOARD_PROFILES, FN_MEMORY_WRITE, chunk)?;
        }
        self.client
            .call(features::ONBOARD_PROFILES, FN_MEMORY_WRITE_END, &[])?;

        debug!(page, verify, "Wrote memory page");
        Ok(())
    }

    /// Whether the device runs from its onboard profiles.
    pub fn onboard_mode(&mut self) -> Result<bool> {
        let params = self
            .client
            .call(features::ONBOARD_PROFILES, FN_GET_ONBOARD_MODE, &[])?;
        Ok(OnboardMode::from_byte(params.first().copied().unwrap_or(0)) == Some(OnboardMode::Onboard))
    }

    pub fn set_onboard_mode(&mut self, onboard: bool) -> Result<()> {
        let mode = if onboard {
            OnboardMode::Onboard
        } else {
            OnboardMode::Host
        };
        self.client
            .call(features::ONBOARD_PROFILES, FN_SET_ONBOARD_MODE, &[mode as u8])?;
        info!(?mode, "Set onboard mode");
        Ok(())
    }

    /// 1-based index of the active profile.
    pub fn current_profile(&mut self) -> Result<u8> {
        let params = self
            .client
            .call(features::ONBOARD_PROFILES, FN_GET_CURRENT_PROFILE, &[0x00])?;
        Ok(params.get(1).copied().unwrap_or(0))
    }

    /// Make `profile` the active one, making it visible first if needed.
    ///
    /// Switching to the active profile changes nothing.
    pub fn set_current_profile(&mut self, profile: u8) -> Result<SlotChange> {
        self.check_profile(profile)?;
        let current = self.current_profile()?;
        if current == profile {
            warn!(profile, "Already on profile");
            return Ok(SlotChange::Unchanged);
        }

        let slot = self.slot(profile)?;
        if !slot.is_enabled() {
            return Err(Error::InvalidStateTransition(format!(
                "profile {profile} is disabled, enable it first"
            )));
        }
        if !slot.visible {
            info!(profile, "Making profile visible before switching");
            self.set_profile_visibility(profile, true)?;
        }

        self.client.call(
            features::ONBOARD_PROFILES,
            FN_SET_CURRENT_PROFILE,
            &[0x00, profile, 0x00],
        )?;
        info!(from = current, to = profile, "Switched profile");
        Ok(SlotChange::Applied)
    }

    fn slot(&self, profile: u8) -> Result<ProfileSlot> {
        self.directory
            .slot(profile)
            .copied()
            .ok_or(Error::OutOfRange {
                field: "profile",
                value: profile as u32,
                min: 1,
                max: self.directory.len() as u32,
            })
    }

    /// Re-read the directory, rewrite the entry of `profile`, and keep the
    /// in-memory copy in step.
    fn store_slot(&mut self, profile: u8, slot: ProfileSlot) -> Result<()> {
        let mut page = self.read_page(DIRECTORY_PAGE, false)?;
        let offset = ProfileDirectory::entry_offset(profile);
        page[offset..offset + DIRECTORY_ENTRY_LEN].copy_from_slice(&slot.to_entry(profile));
        self.write_page(DIRECTORY_PAGE, &page, true)?;
        if let Some(stored) = self.directory.slot_mut(profile) {
            *stored = slot;
        }
        Ok(())
    }

    /// Enable (and show) or disable `profile`.
    ///
    /// The active profile cannot be disabled; enabling it changes nothing.
    /// The entry written assumes profile `n` lives on page `n`.
    pub fn set_profile_enabled(&mut self, profile: u8, enabled: bool) -> Result<SlotChange> {
        self.check_profile(profile)?;
        if self.current_profile()? == profile {
            if enabled {
                warn!(profile, "Current profile is already enabled");
                return Ok(SlotChange::Unchanged);
            }
            return Err(Error::InvalidStateTransition(format!(
                "cannot disable current profile {profile}"
            )));
        }

        let slot = self.slot(profile)?;
        let target = if enabled {
            ProfileSlot {
                assigned_page: SlotPage::Page(profile as u16),
                visible: true,
            }
        } else {
            ProfileSlot {
                assigned_page: SlotPage::Disabled,
                visible: false,
            }
        };
        if slot == target {
            debug!(profile, enabled, "Profile slot already in requested state");
            return Ok(SlotChange::Unchanged);
        }

        self.store_slot(profile, target)?;
        info!(profile, enabled, "Updated profile slot");
        Ok(SlotChange::Applied)
    }

    /// Show or hide an enabled `profile` in the on-device profile cycle.
    ///
    /// The active profile cannot be hidden.
    pub fn set_profile_visibility(&mut self, profile: u8, visible: bool) -> Result<SlotChange> {
        self.check_profile(profile)?;
        let slot = self.slot(profile)?;
        if !slot.is_enabled() {
            return Err(Error::InvalidStateTransition(format!(
                "profile {profile} is disabled, enable it first"
            )));
        }
        if !visible && self.current_profile()? == profile {
            return Err(Error::InvalidStateTransition(format!(
                "cannot hide current profile {profile}"
            )));
        }
        if slot.visible == visible {
            debug!(profile, visible, "Profile visibility unchanged");
            return Ok(SlotChange::Unchanged);
        }

        self.store_slot(profile, ProfileSlot { visible, ..slot })?;
        info!(profile, visible, "Updated profile visibility");
        Ok(SlotChange::Applied)
    }

    fn check_on_flash(&self, profile: u8) -> Result<u16> {
        self.check_profile(profile)?;
        let primary = self.layout.primary_page(profile);
        match (self.slot(profile)?.assigned_page, primary) {
            (SlotPage::Page(page), Some(primary)) if page == profile as u16 => Ok(primary),
            (SlotPage::Page(page), _) => Err(Error::InvalidStateTransition(format!(
                "profile {profile} is stored on page {page}"
            ))),
            (SlotPage::Disabled, _) => Err(Error::InvalidStateTransition(format!(
                "profile {profile} is disabled"
            ))),
            (SlotPage::OnRom, _) => Err(Error::InvalidStateTransition(format!(
                "profile {profile} is on ROM"
            ))),
        }
    }

    /// Verified primary page of a flash-resident `profile`.
    pub fn load_profile_page(&mut self, profile: u8) -> Result<Vec<u8>> {
        let page = self.check_on_flash(profile)?;
        self.read_page(page, true)
    }

    /// Write `image` for `profile`: the primary page verified, macro pages raw.
    ///
    /// Macro pages must belong to the profile's overflow pages.
    pub fn save_profile(&mut self, profile: u8, image: &ProfileImage) -> Result<()> {
        let primary = self.check_on_flash(profile)?;
        let overflow = self.layout.overflow_pages(profile);
        if let Some((page, _)) = image
            .macro_pages
            .iter()
            .find(|(page, _)| !overflow.contains(page))
        {
            return Err(Error::OutOfRange {
                field: "macro page",
                value: *page as u32,
                min: overflow.first().copied().unwrap_or(0) as u32,
                max: overflow.last().copied().unwrap_or(0) as u32,
            });
        }

        info!(profile, macro_pages = image.macro_pages.len(), "Saving profile");
        self.write_page(primary, &image.profile_page, true)?;
        for (page, data) in &image.macro_pages {
            self.write_page(*page, data, false)?;
        }
        Ok(())
    }

    /// One token per profile: `*` current, `-` hidden, `x` disabled or on ROM.
    pub fn status_line(&mut self) -> Result<String> {
        let current = self.current_profile()?;
        let tokens = self
            .directory
            .iter()
            .map(|(profile, slot)| {
                let mut token = profile.to_string();
                if profile == current {
                    token.push('*');
                }
                if !slot.is_enabled() {
                    token.push('x');
                } else if !slot.visible {
                    token.push('-');
                }
                token
            })
            .collect::<Vec<_>>();
        Ok(tokens.join(" "))
    }
}

impl PageSource for OnboardProfiles {
    fn page_size(&self) -> usize {
        self.description.page_size as usize
    }

    fn page_count(&self) -> u16 {
        self.description.page_count
    }

    fn profile_count(&self) -> u8 {
        self.description.profile_count
    }

    fn read_page(&mut self, page: u16) -> Result<Vec<u8>> {
        OnboardProfiles::read_page(self, page, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{seal, SimulatedDevice, SIM_DEVICE_INDEX};
    use std::sync::Arc;

    fn open(sim: &Arc<SimulatedDevice>) -> OnboardProfiles {
        let client = FeatureClient::new(Box::new(Arc::clone(sim)), SIM_DEVICE_INDEX, 0x0F);
        OnboardProfiles::open(client, None).unwrap()
    }

    fn g502() -> Arc<SimulatedDevice> {
        Arc::new(SimulatedDevice::new(5, 11, 16, 256))
    }

    fn disable_in_directory(sim: &SimulatedDevice, profile: u8) {
        let mut dir = sim.page(0);
        let offset = ProfileDirectory::entry_offset(profile);
        dir[offset..offset + 4].copy_from_slice(&[0xFF; 4]);
        seal(&mut dir);
        sim.set_page(0, dir);
    }

    fn description_bytes() -> Vec<u8> {
        vec![0x01, 0x02, 0x01, 0x05, 0x01, 0x0B, 0x10, 0x01, 0x00, 0x0A]
    }

    #[test]
    fn description_parses_g502() {
        let desc = MemoryDescription::parse(&description_bytes()).unwrap();
        assert_eq!(desc.profile_count, 5);
        assert_eq!(desc.button_count, 11);
        assert_eq!(desc.page_count, 16);
        assert_eq!(desc.page_size, 256);
        assert_eq!(desc.gshift_button_count(), 11);
    }

    #[test]
    fn description_rejects_unsupported_fields() {
        let cases: [(usize, u8); 5] = [(0, 2), (1, 6), (2, 0), (5, 17), (8, 0x80)];
        for (pos, value) in cases {
            let mut bytes = description_bytes();
            bytes[pos] = value;
            assert!(
                matches!(
                    MemoryDescription::parse(&bytes),
                    Err(Error::UnsupportedDevice(_))
                ),
                "byte {pos} = {value:#04x} should be rejected"
            );
        }
    }

    #[test]
    fn description_accepts_1024_byte_pages() {
        let mut bytes = description_bytes();
        bytes[7] = 0x04;
        bytes[8] = 0x00;
        assert_eq!(MemoryDescription::parse(&bytes).unwrap().page_size, 1024);
    }

    #[test]
    fn gshift_absent_without_flag() {
        let mut bytes = description_bytes();
        bytes[9] = 0x01;
        assert_eq!(MemoryDescription::parse(&bytes).unwrap().gshift_button_count(), 0);
    }

    #[test]
    fn layout_16_pages_5_profiles() {
        let layout = PageLayout::compute(16, 5);
        assert_eq!(layout.plan(1).unwrap(), &[1, 6, 7]);
        assert_eq!(layout.plan(2).unwrap(), &[2, 8, 9]);
        assert_eq!(layout.plan(5).unwrap(), &[5, 14, 15]);
        assert!(layout.plan(0).is_none());
        assert!(layout.plan(6).is_none());

        let mut all: Vec<u16> = (1..=5).flat_map(|p| layout.plan(p).unwrap().to_vec()).collect();
        for p in 1..=5 {
            assert_eq!(layout.overflow_pages(p).len(), 2);
        }
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn layout_without_spare_pages_has_no_overflow() {
        let layout = PageLayout::compute(6, 5);
        assert_eq!(layout.plan(3).unwrap(), &[3]);
        assert!(layout.overflow_pages(3).is_empty());
    }

    #[test]
    fn layout_override_validated() {
        let table = vec![vec![1, 6, 7], vec![2, 10, 11, 12, 15], vec![3, 10, 11], vec![4, 12, 13], vec![5, 14, 15]];
        let layout = PageLayout::from_table(table, 16, 5).unwrap();
        assert_eq!(layout.overflow_pages(2), &[10, 11, 12, 15]);

        assert!(matches!(
            PageLayout::from_table(vec![vec![1]], 16, 5),
            Err(Error::WrongFieldSize { .. })
        ));
        assert!(matches!(
            PageLayout::from_table(vec![vec![1], vec![2], vec![3], vec![4], vec![5, 16]], 16, 5),
            Err(Error::OutOfRange { value: 16, .. })
        ));
    }

    #[test]
    fn directory_parses_markers() {
        let mut page = vec![0xFFu8; 256];
        page[0..4].copy_from_slice(&[0x00, 0x01, 0x01, 0x00]);
        page[4..8].copy_from_slice(&[0x00, 0x02, 0x00, 0x00]);
        page[8..12].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        page[12..16].copy_from_slice(&[0x01, 0xFF, 0x01, 0x00]);
        let dir = ProfileDirectory::parse(&page, 4).unwrap();
        assert_eq!(
            dir.slot(1),
            Some(&ProfileSlot { assigned_page: SlotPage::Page(1), visible: true })
        );
        assert!(!dir.slot(2).unwrap().visible);
        assert_eq!(
            dir.slot(3),
            Some(&ProfileSlot { assigned_page: SlotPage::Disabled, visible: false })
        );
        assert_eq!(dir.slot(4).unwrap().assigned_page, SlotPage::OnRom);
    }

    #[test]
    fn directory_rejects_misplaced_profile() {
        let mut page = vec![0xFFu8; 256];
        page[0..4].copy_from_slice(&[0x00, 0x03, 0x01, 0x00]);
        assert!(matches!(
            ProfileDirectory::parse(&page, 1),
            Err(Error::UnsupportedDevice(_))
        ));
    }

    #[test]
    fn open_reads_geometry_and_directory() {
        let sim = g502();
        let omm = open(&sim);
        assert_eq!(omm.directory().len(), 5);
        assert!(omm.directory().iter().all(|(_, s)| s.is_enabled() && s.visible));
        let geometry = omm.geometry();
        assert_eq!(geometry.button_count, 11);
        assert_eq!(geometry.gshift_button_count, 0);
        assert!(!geometry.extended_report_rate);
    }

    #[test]
    fn open_detects_extended_report_rate() {
        let sim = g502();
        sim.set_extended_report_rate(true);
        assert!(open(&sim).extended_report_rate());
    }

    #[test]
    fn open_rejects_unsupported_page_size() {
        let sim = g502();
        sim.set_description_byte(8, 0x80);
        let client = FeatureClient::new(Box::new(Arc::clone(&sim)), SIM_DEVICE_INDEX, 0x0F);
        assert!(matches!(
            OnboardProfiles::open(client, None),
            Err(Error::UnsupportedDevice(_))
        ));
    }

    #[test]
    fn open_fails_on_corrupt_directory() {
        let sim = g502();
        let mut dir = sim.page(0);
        dir[100] ^= 0x01;
        sim.set_page(0, dir);
        let client = FeatureClient::new(Box::new(Arc::clone(&sim)), SIM_DEVICE_INDEX, 0x0F);
        assert!(matches!(
            OnboardProfiles::open(client, None),
            Err(Error::ChecksumMismatch { page: 0, .. })
        ));
    }

    #[test]
    fn read_page_verifies_checksum() {
        let sim = g502();
        let mut omm = open(&sim);
        assert_eq!(omm.read_page(1, true).unwrap(), sim.page(1));

        let mut broken = sim.page(2);
        broken[10] ^= 0x40;
        sim.set_page(2, broken.clone());
        assert!(matches!(
            omm.read_page(2, true),
            Err(Error::ChecksumMismatch { page: 2, .. })
        ));
        assert_eq!(omm.read_page(2, false).unwrap(), broken);
    }

    #[test]
    fn read_page_out_of_range() {
        let sim = g502();
        let mut omm = open(&sim);
        assert!(matches!(omm.read_page(16, false), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn write_page_seals_when_verified() {
        let sim = g502();
        let mut omm = open(&sim);
        let data = vec![0x42u8; 256];
        omm.write_page(9, &data, true).unwrap();
        let stored = sim.page(9);
        assert!(checksum::verify(&stored));
        assert_eq!(&stored[..254], &data[..254]);

        omm.write_page(10, &data, false).unwrap();
        assert_eq!(sim.page(10), data);
        assert_eq!(sim.commits(), vec![9, 10]);
    }

    #[test]
    fn write_page_rejects_wrong_size() {
        let sim = g502();
        let mut omm = open(&sim);
        assert!(matches!(
            omm.write_page(9, &[0u8; 255], false),
            Err(Error::WrongPageSize { expected: 256, actual: 255 })
        ));
        assert!(sim.commits().is_empty());
    }

    #[test]
    fn onboard_mode_roundtrip() {
        let sim = g502();
        let mut omm = open(&sim);
        assert!(omm.onboard_mode().unwrap());
        omm.set_onboard_mode(false).unwrap();
        assert_eq!(sim.onboard_mode(), 2);
        assert!(!omm.onboard_mode().unwrap());
    }

    #[test]
    fn enabling_current_profile_is_a_no_op() {
        let sim = g502();
        let mut omm = open(&sim);
        assert_eq!(omm.set_profile_enabled(1, true).unwrap(), SlotChange::Unchanged);
        assert!(sim.commits().is_empty());
    }

    #[test]
    fn disabling_current_profile_is_refused() {
        let sim = g502();
        let mut omm = open(&sim);
        assert!(matches!(
            omm.set_profile_enabled(1, false),
            Err(Error::InvalidStateTransition(_))
        ));
        assert!(matches!(
            omm.set_profile_visibility(1, false),
            Err(Error::InvalidStateTransition(_))
        ));
        assert!(sim.commits().is_empty());
    }

    #[test]
    fn enabling_disabled_profile_writes_directory_entry() {
        let sim = g502();
        disable_in_directory(&sim, 3);
        let mut omm = open(&sim);
        assert_eq!(
            omm.directory().slot(3),
            Some(&ProfileSlot { assigned_page: SlotPage::Disabled, visible: false })
        );

        assert_eq!(omm.set_profile_enabled(3, true).unwrap(), SlotChange::Applied);
        let dir = sim.page(0);
        assert_eq!(&dir[8..12], &[0x00, 0x03, 0x01, 0x00]);
        assert!(checksum::verify(&dir));
        assert_eq!(sim.commits(), vec![0]);
        assert_eq!(omm.directory().slot(3).unwrap().assigned_page, SlotPage::Page(3));
    }

    #[test]
    fn disabling_profile_clears_entry() {
        let sim = g502();
        let mut omm = open(&sim);
        assert_eq!(omm.set_profile_enabled(4, false).unwrap(), SlotChange::Applied);
        assert_eq!(&sim.page(0)[12..16], &[0xFF; 4]);
        assert_eq!(omm.set_profile_enabled(4, false).unwrap(), SlotChange::Unchanged);
        assert_eq!(sim.commits(), vec![0]);
        assert!(matches!(
            omm.set_profile_visibility(4, true),
            Err(Error::InvalidStateTransition(_))
        ));
        assert!(matches!(omm.load_profile_page(4), Err(Error::InvalidStateTransition(_))));
    }

    #[test]
    fn visibility_patches_flag_byte() {
        let sim = g502();
        let mut omm = open(&sim);
        assert_eq!(omm.set_profile_visibility(2, false).unwrap(), SlotChange::Applied);
        assert_eq!(&sim.page(0)[4..8], &[0x00, 0x02, 0x00, 0x00]);
        assert_eq!(omm.set_profile_visibility(2, false).unwrap(), SlotChange::Unchanged);
        assert_eq!(omm.status_line().unwrap(), "1* 2- 3 4 5");
    }

    #[test]
    fn switching_to_hidden_profile_shows_it_first() {
        let sim = g502();
        let mut omm = open(&sim);
        omm.set_profile_visibility(3, false).unwrap();
        assert_eq!(omm.set_current_profile(3).unwrap(), SlotChange::Applied);
        assert_eq!(sim.current_profile(), 3);
        assert!(omm.directory().slot(3).unwrap().visible);
        assert_eq!(sim.page(0)[10], 0x01);
    }

    #[test]
    fn switching_to_current_profile_is_a_no_op() {
        let sim = g502();
        let mut omm = open(&sim);
        assert_eq!(omm.set_current_profile(1).unwrap(), SlotChange::Unchanged);
        assert!(matches!(omm.set_current_profile(6), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn switching_to_disabled_profile_is_refused() {
        let sim = g502();
        disable_in_directory(&sim, 5);
        let mut omm = open(&sim);
        assert!(matches!(
            omm.set_current_profile(5),
            Err(Error::InvalidStateTransition(_))
        ));
        assert_eq!(omm.status_line().unwrap(), "1* 2 3 4 5x");
    }

    #[test]
    fn save_profile_writes_primary_and_macro_pages() {
        let sim = g502();
        let mut omm = open(&sim);
        let mut profile_page = sim.page(2);
        profile_page[1] = 2;
        let image = ProfileImage {
            profile_page,
            macro_pages: vec![(8, vec![0xFF; 256])],
        };
        omm.save_profile(2, &image).unwrap();
        assert_eq!(sim.commits(), vec![2, 8]);
        assert!(checksum::verify(&sim.page(2)));
        assert_eq!(sim.page(2)[1], 2);
    }

    #[test]
    fn save_profile_rejects_foreign_macro_page() {
        let sim = g502();
        let mut omm = open(&sim);
        let image = ProfileImage {
            profile_page: sim.page(2),
            macro_pages: vec![(6, vec![0xFF; 256])],
        };
        assert!(matches!(
            omm.save_profile(2, &image),
            Err(Error::OutOfRange { value: 6, .. })
        ));
        assert!(sim.commits().is_empty());
    }

    #[test]
    fn silent_device_times_out() {
        let sim = g502();
        let mut omm = open(&sim);
        sim.set_silent(true);
        assert!(matches!(omm.current_profile(), Err(Error::Timeout(_))));
    }

    #[test]
    fn corrupt_reply_header_is_frame_mismatch() {
        let sim = g502();
        let mut omm = open(&sim);
        sim.set_corrupt_header(true);
        assert!(matches!(omm.read_page(1, false), Err(Error::FrameMismatch { .. })));
    }
}
