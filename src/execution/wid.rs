// src/execution/wid.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a single watch execution.
///
/// Built from the watch id, the watch nonce and the execution time, so a
/// replayed submission of the same logical firing keeps its id while a new
/// firing always gets a fresh one, without any central sequence.
///
/// Rendered as `{watch_id}_{nonce}-{execution_time}` where the time is
/// RFC 3339 in UTC with millisecond precision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Wid {
    watch_id: String,
    nonce: u64,
    execution_time: DateTime<Utc>,
}

impl Wid {
    pub fn new(watch_id: impl Into<String>, nonce: u64, execution_time: DateTime<Utc>) -> Self {
        Self {
            watch_id: watch_id.into(),
            nonce,
            // The rendered form only carries milliseconds; truncate so that
            // parse(display(wid)) == wid.
            execution_time: execution_time.trunc_subsecs(3),
        }
    }

    pub fn watch_id(&self) -> &str {
        &self.watch_id
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn execution_time(&self) -> DateTime<Utc> {
        self.execution_time
    }

    pub fn value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Wid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}-{}",
            self.watch_id,
            self.nonce,
            self.execution_time.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

impl FromStr for Wid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Watch ids may contain '_' themselves, but neither the nonce nor the
        // timestamp do, so the last '_' is the separator.
        let (watch_id, rest) = s
            .rsplit_once('_')
            .ok_or_else(|| format!("invalid watch record id [{s}]: missing '_' separator"))?;
        if watch_id.is_empty() {
            return Err(format!("invalid watch record id [{s}]: empty watch id"));
        }
        let (nonce, time) = rest
            .split_once('-')
            .ok_or_else(|| format!("invalid watch record id [{s}]: missing '-' separator"))?;
        let nonce: u64 = nonce
            .parse()
            .map_err(|e| format!("invalid watch record id [{s}]: bad nonce '{nonce}': {e}"))?;
        let execution_time = DateTime::parse_from_rfc3339(time)
            .map_err(|e| format!("invalid watch record id [{s}]: bad time '{time}': {e}"))?
            .with_timezone(&Utc);

        Ok(Wid::new(watch_id, nonce, execution_time))
    }
}

impl Serialize for Wid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Wid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
