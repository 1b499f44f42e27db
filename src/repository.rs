//! Location table storage.
//!
//! [`IpRepository`] is the seam between the lookup service and wherever the
//! table lives. The only backend is [`FileRepository`], which loads a CSV file
//! of `ip,city,country` rows into memory.

use csv::{ByteRecord, ReaderBuilder, Trim};
use std::collections::HashMap;
use std::fs::File;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use crate::config::{DatabaseConfig, DatabaseType};
use crate::error::LookupError;
use crate::models::Location;

/// Storage backend for the location table
pub trait IpRepository: Send + Sync {
    /// Load data or connect; must be called before lookups.
    fn initialize(&self) -> Result<(), LookupError>;

    fn find_location(&self, ip: IpAddr) -> Result<Location, LookupError>;

    fn health_check(&self) -> Result<(), LookupError>;

    /// Release the table; lookups fail with `NotInitialized` afterwards.
    fn close(&self);
}

/// Build the repository selected by `config`.
pub fn create_repository(config: &DatabaseConfig) -> Result<Arc<dyn IpRepository>, LookupError> {
    match config.kind {
        DatabaseType::Csv => Ok(Arc::new(FileRepository::new(&config.file_path))),
        other => Err(LookupError::UnsupportedDatabase(format!(
            "{} repository not implemented",
            other
        ))),
    }
}

/// In-memory table loaded from a CSV file
pub struct FileRepository {
    path: PathBuf,
    table: RwLock<Option<HashMap<IpAddr, Location>>>,
}

impl FileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: RwLock::new(None),
        }
    }

    /// Number of loaded rows, zero before `initialize`.
    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<HashMap<IpAddr, Location>, LookupError> {
        let file = File::open(&self.path).map_err(|source| LookupError::Io {
            path: self.display_path(),
            source,
        })?;

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(file);

        let mut table = HashMap::new();
        let mut skipped = 0usize;
        // byte records so one row with invalid UTF-8 is skipped rather than
        // failing the whole load
        let mut records = reader.byte_records();

        let first = records
            .next()
            .ok_or_else(|| LookupError::EmptyDataFile(self.display_path()))??;

        // a first row whose first field is not an address is a header
        let header = first
            .get(0)
            .and_then(|field| std::str::from_utf8(field).ok())
            .map_or(true, |field| field.parse::<IpAddr>().is_err());
        let rows = (!header).then_some(Ok(first)).into_iter().chain(records);

        for (line, record) in rows.enumerate() {
            let record = record?;
            match parse_record(&record) {
                Ok((ip, location)) => {
                    table.insert(ip, location);
                }
                Err(reason) => {
                    skipped += 1;
                    warn!(
                        line = line + 1 + usize::from(header),
                        record = ?record,
                        %reason,
                        "Skipping malformed location record"
                    );
                }
            }
        }

        info!(
            path = %self.path.display(),
            entries = table.len(),
            skipped,
            "Loaded location table"
        );

        Ok(table)
    }
}

fn parse_record(record: &ByteRecord) -> Result<(IpAddr, Location), String> {
    if record.len() != 3 {
        return Err(format!("expected 3 fields, got {}", record.len()));
    }

    let field = |index: usize| {
        std::str::from_utf8(&record[index])
            .map_err(|_| format!("field {} is not valid UTF-8", index + 1))
    };
    let (ip, city, country) = (field(0)?, field(1)?, field(2)?);
    if ip.is_empty() || city.is_empty() || country.is_empty() {
        return Err("empty field".to_string());
    }

    let ip = ip
        .parse::<IpAddr>()
        .map_err(|_| format!("invalid IP address: {}", ip))?;

    Ok((ip, Location::new(country, city)))
}

impl IpRepository for FileRepository {
    fn initialize(&self) -> Result<(), LookupError> {
        let table = self.load()?;
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Some(table);
        Ok(())
    }

    fn find_location(&self, ip: IpAddr) -> Result<Location, LookupError> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let table = table.as_ref().ok_or(LookupError::NotInitialized)?;

        table
            .get(&ip)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(ip.to_string()))
    }

    fn health_check(&self) -> Result<(), LookupError> {
        if self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
        {
            return Err(LookupError::NotInitialized);
        }

        if !self.path.exists() {
            return Err(LookupError::MissingDataFile(self.display_path()));
        }

        Ok(())
    }

    fn close(&self) {
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn loaded(contents: &str) -> (NamedTempFile, FileRepository) {
        let file = csv_file(contents);
        let repo = FileRepository::new(file.path());
        repo.initialize().unwrap();
        (file, repo)
    }

    #[test]
    fn test_loads_rows_and_skips_header() {
        let (_file, repo) = loaded(
            "ip,city,country\n\
             8.8.8.8,Mountain View,United States\n\
             2001:db8::1, Berlin , Germany\n",
        );

        assert_eq!(repo.len(), 2);
        assert_eq!(
            repo.find_location("8.8.8.8".parse().unwrap()).unwrap(),
            Location::new("United States", "Mountain View")
        );
        assert_eq!(
            repo.find_location("2001:DB8:0:0:0:0:0:1".parse().unwrap()).unwrap(),
            Location::new("Germany", "Berlin")
        );
    }

    #[test]
    fn test_first_row_without_header_is_data() {
        let (_file, repo) = loaded("1.1.1.1,Sydney,Australia\n9.9.9.9,Zurich,Switzerland\n");
        assert_eq!(repo.len(), 2);
        assert!(repo.find_location("1.1.1.1".parse().unwrap()).is_ok());
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let (_file, repo) = loaded(
            "ip,city,country\n\
             1.1.1.1,Sydney,Australia\n\
             not-an-ip,Nowhere,Atlantis\n\
             2.2.2.2,,France\n\
             3.3.3.3,Paris\n\
             4.4.4.4,Lyon,France,extra\n\
             5.5.5.5,Madrid,Spain\n",
        );

        assert_eq!(repo.len(), 2);
        assert!(matches!(
            repo.find_location("2.2.2.2".parse().unwrap()),
            Err(LookupError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_row_is_skipped() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"ip,city,country\n1.1.1.1,Sydney,Australia\n").unwrap();
        file.write_all(b"2.2.2.2,\xff\xfeLyon,France\n").unwrap();
        file.write_all(b"3.3.3.3,Paris,France\n").unwrap();
        file.flush().unwrap();

        let repo = FileRepository::new(file.path());
        repo.initialize().unwrap();

        assert_eq!(repo.len(), 2);
        assert!(matches!(
            repo.find_location("2.2.2.2".parse().unwrap()),
            Err(LookupError::NotFound(_))
        ));
        assert_eq!(
            repo.find_location("3.3.3.3".parse().unwrap()).unwrap(),
            Location::new("France", "Paris")
        );
    }

    #[test]
    fn test_missing_file_fails_to_initialize() {
        let repo = FileRepository::new("/definitely/not/here.csv");
        assert!(matches!(repo.initialize(), Err(LookupError::Io { .. })));
    }

    #[test]
    fn test_empty_file_fails_to_initialize() {
        let file = csv_file("");
        let repo = FileRepository::new(file.path());
        assert!(matches!(repo.initialize(), Err(LookupError::EmptyDataFile(_))));
    }

    #[test]
    fn test_lookup_before_initialize() {
        let repo = FileRepository::new("unused.csv");
        assert!(matches!(
            repo.find_location("1.1.1.1".parse().unwrap()),
            Err(LookupError::NotInitialized)
        ));
        assert!(matches!(repo.health_check(), Err(LookupError::NotInitialized)));
    }

    #[test]
    fn test_health_check_and_close() {
        let (file, repo) = loaded("1.1.1.1,Sydney,Australia\n");
        assert!(repo.health_check().is_ok());

        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
        assert!(matches!(repo.health_check(), Err(LookupError::MissingDataFile(_))));

        repo.close();
        assert!(repo.is_empty());
        assert!(matches!(
            repo.find_location("1.1.1.1".parse().unwrap()),
            Err(LookupError::NotInitialized)
        ));
    }

    #[test]
    fn test_factory() {
        let csv = DatabaseConfig {
            kind: DatabaseType::Csv,
            file_path: PathBuf::from("/test/path.csv"),
        };
        assert!(create_repository(&csv).is_ok());

        for kind in [
            DatabaseType::Json,
            DatabaseType::Xml,
            DatabaseType::Postgres,
            DatabaseType::Mysql,
            DatabaseType::Redis,
        ] {
            let config = DatabaseConfig {
                kind,
                file_path: PathBuf::from("/test/path.csv"),
            };
            assert!(matches!(
                create_repository(&config),
                Err(LookupError::UnsupportedDatabase(_))
            ));
        }
    }
}
