use serde::{Deserialize, Serialize};
use std::fmt;

/// An external work-management platform documents can be exported to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Monday,
    Smartsheet,
    GoogleSheets,
    Microsoft365,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Monday,
        Platform::Smartsheet,
        Platform::GoogleSheets,
        Platform::Microsoft365,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Monday => "monday",
            Platform::Smartsheet => "smartsheet",
            Platform::GoogleSheets => "google_sheets",
            Platform::Microsoft365 => "microsoft365",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Monday => "Monday.com",
            Platform::Smartsheet => "Smartsheet",
            Platform::GoogleSheets => "Google Sheets",
            Platform::Microsoft365 => "Microsoft 365",
        }
    }

    pub fn parse(value: &str) -> Option<Platform> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "monday" | "monday.com" => Some(Platform::Monday),
            "smartsheet" => Some(Platform::Smartsheet),
            "google_sheets" | "google" => Some(Platform::GoogleSheets),
            "microsoft365" | "microsoft_365" | "microsoft" => Some(Platform::Microsoft365),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
