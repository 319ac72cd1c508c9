//! Exposure profile commands

use clap::Subcommand;
use tabled::Tabled;

use earguard_exposure::{
    allowed_duration_seconds, percent_to_level, zone_from_level, ExposureProfile, ProfilePreset,
};
use earguard_runtime::format_hms;

use crate::output::{print_info, print_table};

/// Profile subcommands
#[derive(Subcommand)]
pub enum ProfileCommands {
    /// List the built-in presets
    List,

    /// Preview a candidate profile across the volume range
    Preview {
        /// Starting preset (niosh, who)
        #[arg(short, long, default_value = "niosh")]
        preset: ProfilePreset,

        /// Reference level override in dB
        #[arg(long)]
        ref_db: Option<f64>,

        /// Exchange rate override in dB
        #[arg(long)]
        exchange_rate: Option<f64>,

        /// Level at 0 % volume
        #[arg(long)]
        min_db: Option<f64>,

        /// Level at 100 % volume
        #[arg(long)]
        max_db: Option<f64>,
    },
}

/// Table row for preset display
#[derive(Debug, Tabled)]
struct PresetRow {
    preset: String,
    profile: String,
    at_85_db: String,
    at_90_db: String,
}

/// Table row for a volume step of a profile
#[derive(Debug, Tabled)]
struct LevelRow {
    volume: String,
    level: String,
    zone: String,
    allowed: String,
}

/// Execute a profile command
pub fn execute(command: &ProfileCommands) -> anyhow::Result<()> {
    match command {
        ProfileCommands::List => {
            let rows = [ProfilePreset::Niosh, ProfilePreset::Who]
                .into_iter()
                .map(|preset| {
                    let profile = ExposureProfile::default().with_preset(preset);
                    let preview = profile.preview();
                    PresetRow {
                        preset: preset.to_string(),
                        profile: profile.describe(),
                        at_85_db: preview.at_85_db,
                        at_90_db: preview.at_90_db,
                    }
                })
                .collect();
            print_table::<PresetRow>(rows);
            Ok(())
        }

        ProfileCommands::Preview {
            preset,
            ref_db,
            exchange_rate,
            min_db,
            max_db,
        } => {
            let mut profile = ExposureProfile::default().with_preset(*preset);
            if let Some(v) = ref_db {
                profile.ref_db = *v;
            }
            if let Some(v) = exchange_rate {
                profile.exchange_rate_db = *v;
            }
            if let Some(v) = min_db {
                profile.min_db = *v;
            }
            if let Some(v) = max_db {
                profile.max_db = *v;
            }
            profile.validate()?;

            let preview = profile.preview();
            print_info(&format!(
                "{} [{}] | 85 dB: {} | 90 dB: {} | SAFE below {:.0} dB",
                profile.describe(),
                profile.preset(),
                preview.at_85_db,
                preview.at_90_db,
                profile.safe_level_db()
            ));
            print_table(level_rows(&profile));
            Ok(())
        }
    }
}

fn level_rows(profile: &ExposureProfile) -> Vec<LevelRow> {
    (0..=10)
        .map(|step| {
            let volume = f64::from(step * 10);
            let level = percent_to_level(volume, profile);
            LevelRow {
                volume: format!("{volume:.0}%"),
                level: format!("{level:.1} dB"),
                zone: zone_from_level(level, profile).to_string(),
                allowed: format_hms(allowed_duration_seconds(level, profile)),
            }
        })
        .collect()
}
