//! UDF registration service
//!
//! Non-temporary registrations are appended to a line-oriented log so a
//! restarted node can rebuild its function table. The log lives under the
//! node's data dir as `udf/ulog.txt`, with a `.tmp` sibling carrying the
//! live appends:
//!
//! - `start` recovers from the `.tmp` file if one exists (a previous run
//!   stopped uncleanly), otherwise from `ulog.txt` which is then renamed to
//!   `.tmp`; either way new appends go to the `.tmp` file.
//! - `stop` rewrites `ulog.txt` as a compact snapshot of the surviving
//!   non-temporary registrations and deletes the `.tmp` file.
//!
//! Each line is `<type>,<function>[,<implementation>]` where type `1` is a
//! registration and type `2` a deregistration.

use parking_lot::RwLock;
use seriesio_common::{Error, Result};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const REGISTER_TYPE: u8 = 1;
const DEREGISTER_TYPE: u8 = 2;

/// One registered function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UdfRegistration {
    pub function_name: String,
    /// Fully qualified identifier of the function implementation
    pub implementation: String,
    /// Temporary registrations vanish on restart
    pub is_temporary: bool,
}

struct Inner {
    registrations: HashMap<String, UdfRegistration>,
    temporary_log: Option<File>,
}

/// Registry of user-defined functions with durable recovery.
pub struct UdfRegistrationService {
    log_dir: PathBuf,
    inner: RwLock<Inner>,
}

impl UdfRegistrationService {
    /// `data_dir` is the node data directory; the log lives in its `udf/`
    /// subdirectory. Call [`start`](Self::start) before registering
    /// non-temporary functions.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            log_dir: data_dir.join("udf"),
            inner: RwLock::new(Inner {
                registrations: HashMap::new(),
                temporary_log: None,
            }),
        }
    }

    fn log_file(&self) -> PathBuf {
        self.log_dir.join("ulog.txt")
    }

    fn temporary_log_file(&self) -> PathBuf {
        self.log_dir.join("ulog.txt.tmp")
    }

    /// Recover previously registered functions and open the live log.
    pub fn start(&self) -> Result<()> {
        fs::create_dir_all(&self.log_dir)?;
        let log_file = self.log_file();
        let temporary_log_file = self.temporary_log_file();

        if temporary_log_file.exists() {
            // the previous run did not stop cleanly; its snapshot is stale
            if log_file.exists() {
                fs::remove_file(&log_file)?;
            }
            self.recover_from(&temporary_log_file)?;
        } else if log_file.exists() {
            self.recover_from(&log_file)?;
            fs::rename(&log_file, &temporary_log_file)?;
        }

        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&temporary_log_file)?;
        self.inner.write().temporary_log = Some(writer);
        info!(
            functions = self.inner.read().registrations.len(),
            "UDF registration service started"
        );
        Ok(())
    }

    /// Snapshot surviving registrations into `ulog.txt` and drop the
    /// live log.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.write();
        let mut snapshot = File::create(self.log_file())?;
        for registration in inner.registrations.values() {
            if registration.is_temporary {
                continue;
            }
            writeln!(
                snapshot,
                "{REGISTER_TYPE},{},{}",
                registration.function_name, registration.implementation
            )?;
        }
        snapshot.flush()?;
        inner.temporary_log = None;
        fs::remove_file(self.temporary_log_file())?;
        Ok(())
    }

    /// Register a function. Non-temporary registrations are logged; a log
    /// append failure rolls the in-memory registration back.
    pub fn register(
        &self,
        function_name: &str,
        implementation: &str,
        is_temporary: bool,
    ) -> Result<()> {
        self.register_internal(function_name, implementation, is_temporary, true)
    }

    fn register_internal(
        &self,
        function_name: &str,
        implementation: &str,
        is_temporary: bool,
        write_to_log: bool,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.registrations.get(function_name) {
            let message = if existing.implementation == implementation {
                if existing.is_temporary == is_temporary {
                    format!(
                        "UDF {function_name}({implementation}) has already been registered"
                    )
                } else {
                    format!(
                        "failed to register {}temporary UDF {function_name}({implementation}): \
                         a {}temporary UDF with the same name and implementation exists",
                        if is_temporary { "" } else { "non-" },
                        if existing.is_temporary { "" } else { "non-" },
                    )
                }
            } else {
                format!(
                    "failed to register UDF {function_name}({implementation}): \
                     {function_name}({}) is already registered with a different implementation",
                    existing.implementation
                )
            };
            warn!("{message}");
            return Err(Error::UdfRegistration(message));
        }

        inner.registrations.insert(
            function_name.to_string(),
            UdfRegistration {
                function_name: function_name.to_string(),
                implementation: implementation.to_string(),
                is_temporary,
            },
        );

        if write_to_log && !is_temporary {
            let appended = match inner.temporary_log.as_mut() {
                Some(log) => writeln!(log, "{REGISTER_TYPE},{function_name},{implementation}")
                    .and_then(|()| log.flush())
                    .map_err(Error::from),
                None => Err(Error::UdfRegistration(
                    "registration service is not started".to_string(),
                )),
            };
            if let Err(e) = appended {
                inner.registrations.remove(function_name);
                return Err(Error::UdfRegistration(format!(
                    "failed to append UDF log when registering {function_name}({implementation}): {e}"
                )));
            }
        }
        info!(function = function_name, implementation, is_temporary, "UDF registered");
        Ok(())
    }

    /// Deregister a function. The removal is rolled back if it cannot be
    /// logged.
    pub fn deregister(&self, function_name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(removed) = inner.registrations.remove(function_name) else {
            return Err(Error::UdfRegistration(format!(
                "UDF {function_name} does not exist"
            )));
        };

        if !removed.is_temporary {
            let appended = match inner.temporary_log.as_mut() {
                Some(log) => writeln!(log, "{DEREGISTER_TYPE},{function_name}")
                    .and_then(|()| log.flush())
                    .map_err(Error::from),
                None => Err(Error::UdfRegistration(
                    "registration service is not started".to_string(),
                )),
            };
            if let Err(e) = appended {
                inner
                    .registrations
                    .insert(function_name.to_string(), removed);
                return Err(Error::UdfRegistration(format!(
                    "failed to append UDF log when deregistering {function_name}: {e}"
                )));
            }
        }
        info!(function = function_name, "UDF deregistered");
        Ok(())
    }

    /// Look up one registration.
    #[must_use]
    pub fn get(&self, function_name: &str) -> Option<UdfRegistration> {
        self.inner.read().registrations.get(function_name).cloned()
    }

    /// All current registrations, in no particular order.
    #[must_use]
    pub fn registrations(&self) -> Vec<UdfRegistration> {
        self.inner.read().registrations.values().cloned().collect()
    }

    fn recover_from(&self, path: &Path) -> Result<()> {
        let mut recovered: HashMap<String, String> = HashMap::new();
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            let mut fields = line.split(',');
            let kind = fields
                .next()
                .and_then(|t| t.parse::<u8>().ok())
                .ok_or_else(|| {
                    Error::UdfRegistration(format!("malformed UDF log line: {line}"))
                })?;
            let name = fields.next().ok_or_else(|| {
                Error::UdfRegistration(format!("malformed UDF log line: {line}"))
            })?;
            match kind {
                REGISTER_TYPE => {
                    let implementation = fields.next().ok_or_else(|| {
                        Error::UdfRegistration(format!("malformed UDF log line: {line}"))
                    })?;
                    recovered.insert(name.to_string(), implementation.to_string());
                }
                DEREGISTER_TYPE => {
                    recovered.remove(name);
                }
                other => {
                    return Err(Error::UdfRegistration(format!(
                        "unknown UDF log record type: {other}"
                    )));
                }
            }
        }
        for (name, implementation) in recovered {
            self.register_internal(&name, &implementation, false, false)?;
        }
        Ok(())
    }
}
