use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::auth::token::TokenRecord;

/// Outcome of reading the token cache.
#[derive(Debug, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(TokenRecord),
    Missing,
    Corrupt(String),
}

pub trait TokenStorage {
    fn load(&self) -> CacheLookup;
    fn save(&self, record: &TokenRecord) -> Result<()>;
}

#[derive(Debug)]
pub struct JsonTokenStorage {
    filename: PathBuf,
}

impl JsonTokenStorage {
    pub fn new(filename: PathBuf) -> Self {
        Self { filename }
    }

    fn temp_filename(&self) -> PathBuf {
        let mut name = self.filename.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl TokenStorage for JsonTokenStorage {
    fn load(&self) -> CacheLookup {
        let file = match File::open(&self.filename) {
            Ok(file) => file,
            Err(_) => return CacheLookup::Missing,
        };

        let reader = BufReader::new(file);
        match serde_json::from_reader::<_, TokenRecord>(reader) {
            Ok(record) => CacheLookup::Hit(record),
            Err(err) => CacheLookup::Corrupt(err.to_string()),
        }
    }

    fn save(&self, record: &TokenRecord) -> Result<()> {
        log::debug!(
            "saving token expiring at {} to {:?}",
            record.expires_at,
            self.filename
        );

        if let Some(parent) = self.filename.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.temp_filename();
        let saved = write_synced(&temp, record)
            .and_then(|_| fs::rename(&temp, &self.filename).map_err(Into::into));
        if saved.is_err() {
            let _ = fs::remove_file(&temp);
        }

        saved
    }
}

fn write_synced(path: &Path, record: &TokenRecord) -> Result<()> {
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, record)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;

    Ok(())
}
