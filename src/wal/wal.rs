use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::peer::InfoHash;

/// Durable tracker mutations, one per line
#[derive(Debug, Clone, PartialEq)]
pub enum WalOperation {
    Completed { info_hash: InfoHash },
    /// Folded completions for one swarm, written by compaction
    CompletedTotal { info_hash: InfoHash, count: u64 },
    Allow { ip: IpAddr },
    Deny { ip: IpAddr },
    RemoveAccess { ip: IpAddr },
}

impl fmt::Display for WalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalOperation::Completed { info_hash } => write!(f, "COMPLETED|{}", info_hash),
            WalOperation::CompletedTotal { info_hash, count } => {
                write!(f, "COMPLETED_TOTAL|{}|{}", info_hash, count)
            }
            WalOperation::Allow { ip } => write!(f, "ALLOW|{}", ip),
            WalOperation::Deny { ip } => write!(f, "DENY|{}", ip),
            WalOperation::RemoveAccess { ip } => write!(f, "REMOVE_ACCESS|{}", ip),
        }
    }
}

impl WalOperation {
    fn parse(line: &str) -> Result<Self> {
        let (kind, value) = line.split_once('|').context("Missing operation separator")?;

        let parse_ip = || value.parse::<IpAddr>().context("Invalid IP address");
        let parse_hash = |hex_str: &str| -> Result<InfoHash> {
            let mut bytes = [0u8; 20];
            hex::decode_to_slice(hex_str, &mut bytes).context("Invalid info_hash hex")?;
            Ok(InfoHash(bytes))
        };

        match kind {
            "COMPLETED" => Ok(WalOperation::Completed {
                info_hash: parse_hash(value)?,
            }),
            "COMPLETED_TOTAL" => {
                let (hash, count) = value.split_once('|').context("Missing completion count")?;
                Ok(WalOperation::CompletedTotal {
                    info_hash: parse_hash(hash)?,
                    count: count.parse().context("Invalid completion count")?,
                })
            }
            "ALLOW" => Ok(WalOperation::Allow { ip: parse_ip()? }),
            "DENY" => Ok(WalOperation::Deny { ip: parse_ip()? }),
            "REMOVE_ACCESS" => Ok(WalOperation::RemoveAccess { ip: parse_ip()? }),
            other => bail!("Unknown operation type: {}", other),
        }
    }
}

pub struct Wal {
    file: Mutex<File>,
    path: PathBuf,
}

impl Wal {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open WAL file {}", path.display()))?;

        Ok(Wal {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // A writer that panicked mid-line leaves at worst one unparsable line,
    // which replay skips.
    fn file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn log_operation(&self, op: &WalOperation) -> Result<()> {
        let mut file = self.file();
        writeln!(file, "{}", op).context("Failed to write to WAL")?;
        file.flush().context("Failed to flush WAL")?;
        Ok(())
    }

    /// Replace the whole log with `operations`.
    ///
    /// The new content is written beside the log and renamed over it, so a crash
    /// leaves either the old log or the new one.
    pub fn rewrite(&self, operations: &[WalOperation]) -> Result<()> {
        let mut file = self.file();
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".compact");
        let tmp_path = PathBuf::from(tmp_path);

        {
            let mut tmp = File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            for op in operations {
                writeln!(tmp, "{}", op).context("Failed to write compacted WAL")?;
            }
            tmp.sync_all().context("Failed to sync compacted WAL")?;
        }

        fs::rename(&tmp_path, &self.path).context("Failed to replace WAL with compacted log")?;

        *file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to reopen WAL file {}", self.path.display()))?;

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

            match WalOperation::parse(line) {
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

/// Append from async code. The write and flush run on the blocking pool.
pub async fn append(wal: &Arc<Wal>, op: WalOperation) -> Result<()> {
    let wal = Arc::clone(wal);
    tokio::task::spawn_blocking(move || wal.log_operation(&op))
        .await
        .context("WAL writer task failed")?
}

/// Fold a replayed log into the shortest log that restores the same state.
///
/// Completions become one total per swarm. Each IP keeps only its last access change.
pub fn compact(operations: &[WalOperation]) -> Vec<WalOperation> {
    let mut totals: BTreeMap<InfoHash, u64> = BTreeMap::new();
    let mut access: BTreeMap<IpAddr, WalOperation> = BTreeMap::new();

    for op in operations {
        match op {
            WalOperation::Completed { info_hash } => *totals.entry(*info_hash).or_insert(0) += 1,
            WalOperation::CompletedTotal { info_hash, count } => {
                *totals.entry(*info_hash).or_insert(0) += count
            }
            WalOperation::Allow { ip } | WalOperation::Deny { ip } | WalOperation::RemoveAccess { ip } => {
                access.insert(*ip, op.clone());
            }
        }
    }

    totals
        .into_iter()
        .map(|(info_hash, count)| WalOperation::CompletedTotal { info_hash, count })
        .chain(access.into_values())
        .collect()
}
