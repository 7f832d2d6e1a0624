use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// WAL operation types
#[derive(Debug, Clone, PartialEq)]
pub enum WalOperation {
    Set { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl WalOperation {
    fn to_line(&self) -> String {
        match self {
            WalOperation::Set { key, value } => {
                format!("SET|{}|{}", key, hex::encode(value))
            }
            WalOperation::Delete { key } => format!("DELETE|{}", key),
        }
    }

    fn from_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split('|').collect();

        match parts.first() {
            Some(&"SET") => {
                if parts.len() != 3 {
                    bail!("Invalid SET format");
                }
                validate_key(parts[1])?;
                let value = hex::decode(parts[2]).context("Invalid value hex")?;
                Ok(WalOperation::Set {
                    key: parts[1].to_string(),
                    value,
                })
            }
            Some(&"DELETE") => {
                if parts.len() != 2 {
                    bail!("Invalid DELETE format");
                }
                validate_key(parts[1])?;
                Ok(WalOperation::Delete {
                    key: parts[1].to_string(),
                })
            }
            _ => bail!("Unknown operation type"),
        }
    }
}

/// Keys share the line with the separator, so they may not contain it
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        bail!("Key must not be empty");
    }
    if key.contains(['|', '\n', '\r']) {
        bail!("Key '{}' contains a reserved character", key.escape_debug());
    }
    Ok(())
}

pub struct Wal {
    file: Mutex<File>,
    path: PathBuf,
}

impl Wal {
    pub fn new(path: PathBuf) -> Result<Self> {
        let file = open_append(&path)?;

        Ok(Wal {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn log_operation(&self, op: &WalOperation) -> Result<()> {
        let line = op.to_line();
        let mut file = self.file.lock().map_err(|_| anyhow!("WAL lock poisoned"))?;
        writeln!(file, "{}", line).context("Failed to write to WAL")?;
        file.flush().context("Failed to flush WAL")?;
        Ok(())
    }

    pub fn replay(&self) -> Result<Vec<WalOperation>> {
        let file = File::open(&self.path).context("Failed to open WAL for replay")?;
        let reader = BufReader::new(file);
        let mut operations = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from WAL")?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            match WalOperation::from_line(line) {
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

    /// Replace the whole log with the given operations
    ///
    /// Writes a sibling file first and renames it over the log, so a crash
    /// leaves either the old or the new log in place.
    pub fn rewrite(&self, operations: &[WalOperation]) -> Result<()> {
        let mut file = self.file.lock().map_err(|_| anyhow!("WAL lock poisoned"))?;

        let tmp_path = self.path.with_extension("compact");
        {
            let tmp = File::create(&tmp_path)
                .context(format!("Failed to create {}", tmp_path.display()))?;
            let mut writer = BufWriter::new(tmp);
            for op in operations {
                writeln!(writer, "{}", op.to_line()).context("Failed to write compacted WAL")?;
            }
            writer.flush().context("Failed to flush compacted WAL")?;
            writer
                .get_ref()
                .sync_all()
                .context("Failed to sync compacted WAL")?;
        }

        fs::rename(&tmp_path, &self.path).context("Failed to replace WAL with compacted copy")?;
        *file = open_append(&self.path)?;
        Ok(())
    }
}

fn open_append(path: &PathBuf) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(format!("Failed to open WAL file {}", path.display()))
}
