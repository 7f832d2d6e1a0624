use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::id::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Available,
    Issued,
    Lost,
}

impl KeyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyStatus::Available => "available",
            KeyStatus::Issued => "issued",
            KeyStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(KeyStatus::Available),
            "issued" => Ok(KeyStatus::Issued),
            "lost" => Ok(KeyStatus::Lost),
            other => Err(format!("unknown key status '{}'", other)),
        }
    }
}

/// Who has the key right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Possession {
    Available,
    Issued { to: String, at: String },
    Lost,
}

impl Possession {
    pub fn status(&self) -> KeyStatus {
        match self {
            Possession::Available => KeyStatus::Available,
            Possession::Issued { .. } => KeyStatus::Issued,
            Possession::Lost => KeyStatus::Lost,
        }
    }
}

/// A physical office key
///
/// Holder and issue date exist only inside `Possession::Issued`, so a key
/// can never carry a holder while available or lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "StoredKey", try_from = "StoredKey")]
pub struct KeyRecord {
    pub id: RecordId,
    pub office: String,
    pub department: String,
    pub possession: Possession,
    pub barcode: Option<String>,
}

impl KeyRecord {
    pub fn new(id: RecordId, office: String, department: String, barcode: Option<String>) -> Self {
        Self {
            id,
            office,
            department,
            possession: Possession::Available,
            barcode,
        }
    }

    pub fn status(&self) -> KeyStatus {
        self.possession.status()
    }

    pub fn issued_to(&self) -> Option<&str> {
        match &self.possession {
            Possession::Issued { to, .. } => Some(to),
            _ => None,
        }
    }

    pub fn issued_at(&self) -> Option<&str> {
        match &self.possession {
            Possession::Issued { at, .. } => Some(at),
            _ => None,
        }
    }

    /// Case-insensitive substring match on office, department or holder
    pub fn matches_search(&self, needle_lower: &str) -> bool {
        if needle_lower.is_empty() {
            return true;
        }
        self.office.to_lowercase().contains(needle_lower)
            || self.department.to_lowercase().contains(needle_lower)
            || self
                .issued_to()
                .is_some_and(|holder| holder.to_lowercase().contains(needle_lower))
    }
}

/// Flat layout of a key inside the `keys_data` record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredKey {
    id: RecordId,
    office: String,
    status: KeyStatus,
    department: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issued_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issued_at: Option<String>,
}

impl From<KeyRecord> for StoredKey {
    fn from(key: KeyRecord) -> Self {
        let status = key.status();
        let (issued_to, issued_at) = match key.possession {
            Possession::Issued { to, at } => (Some(to), Some(at)),
            Possession::Available | Possession::Lost => (None, None),
        };
        StoredKey {
            id: key.id,
            office: key.office,
            status,
            department: key.department,
            barcode: key.barcode,
            issued_to,
            issued_at,
        }
    }
}

impl TryFrom<StoredKey> for KeyRecord {
    type Error = String;

    fn try_from(stored: StoredKey) -> Result<Self, Self::Error> {
        let possession = match (stored.status, stored.issued_to, stored.issued_at) {
            (KeyStatus::Issued, Some(to), Some(at)) => Possession::Issued { to, at },
            (KeyStatus::Issued, _, _) => {
                return Err(format!("key {} is issued but has no holder or date", stored.id));
            }
            (KeyStatus::Available, None, None) => Possession::Available,
            (KeyStatus::Lost, None, None) => Possession::Lost,
            (status, _, _) => {
                return Err(format!("key {} is {} but carries holder fields", stored.id, status));
            }
        };
        Ok(KeyRecord {
            id: stored.id,
            office: stored.office,
            department: stored.department,
            possession,
            barcode: stored.barcode,
        })
    }
}

/// Status selector used by key listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(KeyStatus),
}

impl StatusFilter {
    pub fn accepts(self, status: KeyStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => wanted == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(StatusFilter::All)
        } else {
            s.parse().map(StatusFilter::Only)
        }
    }
}

/// Key counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    pub total: usize,
    pub available: usize,
    pub issued: usize,
    pub lost: usize,
}

impl KeyStats {
    pub fn record(&mut self, status: KeyStatus) {
        self.total += 1;
        match status {
            KeyStatus::Available => self.available += 1,
            KeyStatus::Issued => self.issued += 1,
            KeyStatus::Lost => self.lost += 1,
        }
    }
}
