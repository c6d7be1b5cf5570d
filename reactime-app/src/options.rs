use anyhow::{Context, Result};
use reactime_experiment::ParticipantInfo;
use std::env;
use std::path::PathBuf;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Launch settings, read from `REACTIME_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub battery: PathBuf,
    pub session: PathBuf,
    pub font: Option<PathBuf>,
    pub participant: Option<ParticipantInfo>,
}

impl AppOptions {
    pub fn from_env() -> Result<Self> {
        let battery = env::var_os("REACTIME_BATTERY")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("battery.json"));
        let session = env::var_os("REACTIME_SESSION")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("session.json"));
        let font = env::var_os("REACTIME_FONT").map(PathBuf::from).or_else(|| {
            FONT_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
        });

        let participant = match env::var("REACTIME_PARTICIPANT") {
            Ok(name) => {
                let age = env::var("REACTIME_AGE")
                    .ok()
                    .map(|a| a.parse::<u32>())
                    .transpose()
                    .context("REACTIME_AGE must be a whole number")?;
                // The operator launching a named session has collected consent.
                let info = ParticipantInfo {
                    name,
                    age,
                    sex: env::var("REACTIME_SEX").ok(),
                    consent: true,
                    ..Default::default()
                };
                info.validate()?;
                Some(info)
            }
            Err(_) => None,
        };

        Ok(Self {
            battery,
            session,
            font,
            participant,
        })
    }
}
