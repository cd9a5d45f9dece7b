//! omm: onboard profile manager for Logitech HID++ 2.0 mice.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use logi_omm_core::config::SessionConfig;
use logi_omm_core::device;
use logi_omm_core::document::{self, ProfileDocument};
use logi_omm_core::error::Error;
use logi_omm_core::feature::FeatureClient;
use logi_omm_core::onboard::{OnboardProfiles, SlotChange};
use logi_omm_core::profile;
use logi_omm_core::report_rate;
use tracing::{info, warn};

/// Tried in order when no device index is given: wired, then bluetooth.
const DEVICE_INDEX_CANDIDATES: [u8; 2] = [0xFF, 0x00];

#[derive(Parser)]
#[command(
    name = "omm",
    version,
    about = "Manage the onboard profiles of Logitech HID++ 2.0 mice"
)]
struct Cli {
    /// USB product id in hex (e.g. c08b). The first HID++ device is used when omitted.
    #[arg(long, global = true, value_parser = parse_pid)]
    pid: Option<u16>,
    /// HID++ device index: 0xff wired, 0x00 bluetooth, 1-6 receiver slot.
    #[arg(long, global = true, value_parser = parse_device_index)]
    device_index: Option<u8>,
    /// Profile to operate on, starting from 1.
    #[arg(short, long, global = true, default_value_t = 1)]
    profile: u8,
    /// Session configuration file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List connected Logitech devices.
    List,
    /// Show memory geometry and profile status.
    Info,
    /// Switch onboard mode on or off.
    Onboard { state: Toggle },
    /// Enable the profile (and make it visible).
    Enable,
    /// Disable the profile.
    Disable,
    /// Show or hide the profile in the on-device profile cycle.
    Visible { state: Toggle },
    /// Make the profile the active one.
    Switch,
    /// Print the profile as JSON.
    Dump,
    /// Save the profile to a JSON file.
    Export { file: PathBuf },
    /// Write the profile from a JSON file.
    Import {
        file: PathBuf,
        /// Switch to the profile afterwards.
        #[arg(long)]
        switch: bool,
    },
    /// Print a saved binary profile page as JSON.
    Decode { file: PathBuf },
    /// Save raw memory pages (comma separated list) as page-N.bin files.
    DebugOut {
        pages: String,
        #[arg(long, default_value = "debug")]
        dir: PathBuf,
    },
    /// Write a raw memory page without any checks.
    DebugIn {
        file: PathBuf,
        /// Destination page.
        #[arg(long)]
        page: u16,
        /// Confirm the unchecked write.
        #[arg(long)]
        yes: bool,
    },
}

fn parse_pid(text: &str) -> std::result::Result<u16, String> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid pid {text:?}: {e}"))
}

fn parse_device_index(text: &str) -> std::result::Result<u8, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid device index {text:?}: {e}"))
}

fn parse_page_list(text: &str) -> Result<Vec<u16>> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u16>()
                .with_context(|| format!("invalid page number {part:?}"))
        })
        .collect()
}

fn open_session(cli: &Cli) -> Result<OnboardProfiles> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    let candidates = match (cli.device_index, &cli.config) {
        (Some(index), _) => vec![index],
        (None, Some(_)) => vec![config.device_index],
        (None, None) => DEVICE_INDEX_CANDIDATES.to_vec(),
    };

    let mut last_error = None;
    for index in candidates {
        config.device_index = index;
        let (info, transport) = device::open_hidpp(cli.pid, config.timeout_ms)?;
        let client = FeatureClient::from_config(Box::new(transport), &config);
        match OnboardProfiles::open(client, config.page_layout.clone()) {
            Ok(session) => {
                info!(
                    pid = format_args!("0x{:04X}", info.pid),
                    device_index = format_args!("0x{index:02X}"),
                    "Session opened"
                );
                return Ok(session);
            }
            Err(e @ (Error::Timeout(_) | Error::HidppProtocol { .. } | Error::FrameMismatch { .. })) => {
                warn!(device_index = format_args!("0x{index:02X}"), error = %e, "No usable reply");
                last_error = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(last_error
        .map(anyhow::Error::from)
        .unwrap_or_else(|| anyhow!("no usable device index")))
}

/// Print device and memory details. Returns whether onboard mode is on.
fn print_info(session: &mut OnboardProfiles) -> Result<bool> {
    let client = session.client_mut();
    let name = client.device_name().unwrap_or_else(|e| {
        warn!(error = %e, "Cannot read device name");
        "unknown device".to_string()
    });
    let (major, minor) = client.protocol_version()?;
    println!("{name} (HID++ {major}.{minor})");

    if !session.onboard_mode()? {
        println!("onboard mode disabled, run \"omm onboard on\" first");
        return Ok(false);
    }
    let description = session.description();
    println!("number of buttons:   {}", description.button_count);
    println!("number of pages:     {}", description.page_count);
    println!("page size:           {}", description.page_size);
    println!("profile format:      {}", description.profile_format);
    println!("profile status:      {}\n", session.status_line()?);
    Ok(true)
}

/// Show the outcome of a directory change; refused transitions are not failures.
fn report_change(what: &str, result: logi_omm_core::error::Result<SlotChange>) -> Result<()> {
    match result {
        Ok(SlotChange::Applied) => println!("{what}: done"),
        Ok(SlotChange::Unchanged) => println!("{what}: nothing to change"),
        Err(Error::InvalidStateTransition(reason)) => println!("{what}: {reason}"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn export_profile(session: &mut OnboardProfiles, profile: u8) -> Result<ProfileDocument> {
    let page = session.load_profile_page(profile)?;
    let geometry = session.geometry();
    let record = profile::decode(&page, &geometry)?;
    Ok(document::export(&record, &geometry, session)?)
}

fn import_profile(session: &mut OnboardProfiles, profile: u8, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let doc = ProfileDocument::from_json(&text)?;
    let overflow = session.layout().overflow_pages(profile).to_vec();
    let image = document::import(&doc, &session.geometry(), &overflow)
        .map_err(|e| explain_import_error(e, session.extended_report_rate()))?;
    session.save_profile(profile, &image)?;
    println!(
        "Imported {} into profile {profile} ({} macro page(s))",
        file.display(),
        image.macro_pages.len()
    );
    Ok(())
}

/// Point at the accepted values when a document's report rate is refused.
fn explain_import_error(err: Error, extended_report_rate: bool) -> anyhow::Error {
    match err {
        Error::InvalidReportRate(hz) => {
            let accepted: Vec<String> = report_rate::supported_rates(extended_report_rate)
                .iter()
                .map(u16::to_string)
                .collect();
            anyhow!(
                "report rate {hz} Hz not supported by this device, use one of {}",
                accepted.join(", ")
            )
        }
        other => other.into(),
    }
}

fn list_devices(pid: Option<u16>) -> Result<()> {
    let devices = device::unique_devices(&device::discover_devices(pid)?);
    if devices.is_empty() {
        println!("No Logitech devices found.");
        return Ok(());
    }
    for dev in &devices {
        println!("{}", dev.product.as_deref().unwrap_or("Logitech device"));
        println!("SN:  {}", dev.serial.as_deref().unwrap_or("-"));
        println!("PID: 0x{:04X}\n", dev.pid);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let mut session = open_session(cli)?;
    let profile = cli.profile;

    // state changes first so the summary shows their result
    match cli.command {
        Commands::Onboard { state } => {
            session.set_onboard_mode(state.is_on())?;
            print_info(&mut session)?;
            return Ok(());
        }
        Commands::Enable => {
            let result = session.set_profile_enabled(profile, true);
            report_change(&format!("enable profile {profile}"), result)?;
            print_info(&mut session)?;
            return Ok(());
        }
        Commands::Disable => {
            let result = session.set_profile_enabled(profile, false);
            report_change(&format!("disable profile {profile}"), result)?;
            print_info(&mut session)?;
            return Ok(());
        }
        Commands::Visible { state } => {
            let result = session.set_profile_visibility(profile, state.is_on());
            report_change(&format!("profile {profile} visibility"), result)?;
            print_info(&mut session)?;
            return Ok(());
        }
        _ => {}
    }

    if !print_info(&mut session)? {
        return Ok(());
    }

    match &cli.command {
        Commands::Switch => {
            let result = session.set_current_profile(profile);
            report_change(&format!("switch to profile {profile}"), result)?;
        }
        Commands::Dump => {
            let doc = export_profile(&mut session, profile)?;
            println!("Profile {profile}:");
            println!("{}", doc.to_json()?);
        }
        Commands::Export { file } => {
            let doc = export_profile(&mut session, profile)?;
            std::fs::write(file, doc.to_json()?)
                .with_context(|| format!("writing {}", file.display()))?;
            println!("Exported profile {profile} to {}", file.display());
        }
        Commands::Import { file, switch } => {
            import_profile(&mut session, profile, file)?;
            if *switch {
                let result = session.set_current_profile(profile);
                report_change(&format!("switch to profile {profile}"), result)?;
            }
        }
        Commands::Decode { file } => {
            let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
            let geometry = session.geometry();
            let record = profile::decode(&data, &geometry)?;
            let doc = document::export(&record, &geometry, &mut session)?;
            println!("{}", doc.to_json()?);
        }
        Commands::DebugOut { pages, dir } => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            for page in parse_page_list(pages)? {
                let data = session.read_page(page, false)?;
                let path = dir.join(format!("page-{page}.bin"));
                std::fs::write(&path, &data)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("page {page} -> {}", path.display());
            }
        }
        Commands::DebugIn { file, page, yes } => {
            if !*yes {
                bail!("raw page writes skip every check, pass --yes to confirm");
            }
            let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
            session.write_page(*page, &data, false)?;
            println!("Wrote {} to page {page}", file.display());
        }
        Commands::Info
        | Commands::List
        | Commands::Onboard { .. }
        | Commands::Enable
        | Commands::Disable
        | Commands::Visible { .. } => {}
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List => list_devices(cli.pid),
        _ => run(&cli),
    }
}
