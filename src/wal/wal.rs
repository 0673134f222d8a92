use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::models::access::Access;
use crate::models::audit::{AdminLogEntry, CardScan, Training};
use crate::models::card::Card;
use crate::models::location::{Location, Machine};
use crate::models::user::{User, UserType};
use crate::models::{AccessId, LocationId, Timestamp};

/// WAL operation types. Each line of the log is one operation as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalOperation {
    PutLocation(Location),
    PutType(UserType),
    PutMachine(Machine),
    PutUser(User),
    PutCard(Card),
    OpenAccess(Access),
    CloseAccess {
        id: AccessId,
        time_out: Timestamp,
    },
    ClearLocation {
        location_id: LocationId,
        time: Timestamp,
    },
    RecordScan(CardScan),
    AddTraining(Training),
    RemoveTraining {
        id: i64,
    },
    AdminLog(AdminLogEntry),
}

impl WalOperation {
    fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode WAL operation")
    }

    fn decode(line: &str) -> Result<Self> {
        serde_json::from_str(line).context("Failed to decode WAL operation")
    }
}

pub struct Wal {
    file: Mutex<File>,
    path: PathBuf,
}

impl Wal {
    pub fn new(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open WAL file {}", path.display()))?;

        Ok(Wal {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Append one operation and flush it before returning
    pub fn log_operation(&self, op: &WalOperation) -> Result<()> {
        let line = op.encode()?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("WAL file lock poisoned"))?;
        writeln!(file, "{}", line).context("Failed to write to WAL")?;
        file.flush().context("Failed to flush WAL")?;
        Ok(())
    }

    pub fn replay(&self) -> Result<Vec<WalOperation>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to open WAL for replay"),
        };
        let reader = BufReader::new(file);
        let mut operations = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from WAL")?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            match WalOperation::decode(line) {
                Ok(op) => operations.push(op),
                Err(e) => {
                    tracing::warn!(
                        line_num = line_num + 1,
                        error = %e,
                        "Failed to parse WAL line, skipping"
                    );
                }
            }
        }

        Ok(operations)
    }
}
