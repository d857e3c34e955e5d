//! Single-object pages.
//!
//! A [`Page<T>`] stores exactly one value in `Pages/<id>/Content.<ext>`.
//! Unlike tables, pages have no locks or transactions: every write replaces
//! the file atomically.

use crate::config::DatabaseConfig;
use crate::error::CoreResult;
use crate::lifecycle::{wait_until, Lifecycle, LifecycleState, StateCell};
use crate::lock::LOCK_POLL_INTERVAL;
use crate::source::PersistenceBacked;
use crate::types::{ElementType, Record};
use filedb_codec::Format;
use filedb_storage::StorageFile;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Stem of every page content file.
pub const CONTENT_FILE_STEM: &str = "Content";

/// Builds the value of a page that has never been written.
pub type Constructor<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Registration options for a page.
pub struct PageOptions<T> {
    identifier: String,
    constructor: Constructor<T>,
    format: Format,
}

impl<T: Record> PageOptions<T> {
    /// Creates options for a page whose initial value comes from `constructor`.
    pub fn new<F>(identifier: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            identifier: identifier.into(),
            constructor: Arc::new(constructor),
            format: Format::default(),
        }
    }

    /// Sets the format of the content file.
    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Returns the page identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl<T: Record + Default> PageOptions<T> {
    /// Creates options for a page starting at `T::default()`.
    pub fn with_default(identifier: impl Into<String>) -> Self {
        Self::new(identifier, T::default)
    }
}

impl<T> fmt::Debug for PageOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageOptions")
            .field("identifier", &self.identifier)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// A page as seen by the database.
pub trait DynPage: Lifecycle + PersistenceBacked {
    /// Returns the element type.
    fn element_type(&self) -> ElementType;

    /// Returns `self` for downcasting to `Page<T>`.
    fn as_any(&self) -> &dyn Any;

    /// Converts `self` for downcasting to `Arc<Page<T>>`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

struct PageData<T> {
    file: Option<StorageFile>,
    value: Option<T>,
}

/// A persisted single value.
pub struct Page<T> {
    identifier: String,
    format: Format,
    constructor: Constructor<T>,
    shutdown_timeout: Duration,
    directory: RwLock<PathBuf>,
    lifecycle: StateCell,
    data: Mutex<PageData<T>>,
}

impl<T: Record> Page<T> {
    pub(crate) fn new(options: PageOptions<T>, directory: PathBuf, config: &DatabaseConfig) -> Self {
        Self {
            identifier: options.identifier,
            format: options.format,
            constructor: options.constructor,
            shutdown_timeout: config.shutdown_timeout,
            directory: RwLock::new(directory),
            lifecycle: StateCell::new(),
            data: Mutex::new(PageData {
                file: None,
                value: None,
            }),
        }
    }

    /// Returns the path of the content file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.directory()
            .join(format!("{CONTENT_FILE_STEM}.{}", self.format.extension()))
    }

    /// Returns a copy of the stored value.
    ///
    /// A page that was never written, or whose file cannot be decoded,
    /// reads as the constructor's value.
    pub fn read(&self) -> CoreResult<T> {
        self.lifecycle
            .ensure(&self.identifier, LifecycleState::Running)?;
        let mut data = self.data.lock();

        if data.value.is_none() {
            let loaded = self.load(data.file.as_ref());
            data.value = Some(loaded);
        }

        match &data.value {
            Some(value) => Ok(self.format.round_trip(value)?),
            None => Ok((self.constructor)()),
        }
    }

    /// Replaces the stored value with a copy of `value`.
    pub fn write(&self, value: &T) -> CoreResult<()> {
        self.lifecycle
            .ensure(&self.identifier, LifecycleState::Running)?;
        let mut data = self.data.lock();

        let bytes = self.format.encode(value)?;
        if let Some(file) = &data.file {
            file.write(&bytes)?;
        }
        data.value = Some(self.format.decode(&bytes)?);

        debug!(page = %self.identifier, "wrote page");
        Ok(())
    }

    fn load(&self, file: Option<&StorageFile>) -> T {
        let bytes = match file.map(StorageFile::read) {
            Some(Ok(Some(bytes))) if !bytes.is_empty() => bytes,
            Some(Err(e)) => {
                warn!(page = %self.identifier, error = %e, "could not read page, using default");
                return (self.constructor)();
            }
            _ => return (self.constructor)(),
        };

        match self.format.decode(&bytes) {
            Ok(value) => {
                debug!(page = %self.identifier, "loaded page");
                value
            }
            Err(e) => {
                warn!(page = %self.identifier, error = %e, "could not decode page, using default");
                (self.constructor)()
            }
        }
    }

    fn start(&self) -> CoreResult<()> {
        let directory = self.directory();
        fs::create_dir_all(&directory)?;

        let mut data = self.data.lock();
        data.file = Some(StorageFile::new(&self.path()));
        data.value = None;

        info!(page = %self.identifier, format = %self.format, "page started");
        Ok(())
    }

    fn stop(&self) -> CoreResult<()> {
        let mut data = self.data.lock();
        data.value = None;

        if let Some(file) = data.file.take() {
            let free = wait_until(self.shutdown_timeout, LOCK_POLL_INTERVAL, || {
                Ok(file.is_free()?)
            })?;
            if !free {
                warn!(page = %self.identifier, "content file still busy at shutdown");
            }
        }

        info!(page = %self.identifier, "page stopped");
        Ok(())
    }
}

impl<T: Record> Lifecycle for Page<T> {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    fn startup(&self) -> CoreResult<()> {
        self.lifecycle.run_startup(&self.identifier, || self.start())
    }

    fn shutdown(&self) -> CoreResult<()> {
        self.lifecycle.run_shutdown(&self.identifier, || self.stop())
    }
}

impl<T: Record> PersistenceBacked for Page<T> {
    fn format(&self) -> Format {
        self.format
    }

    fn directory(&self) -> PathBuf {
        self.directory.read().clone()
    }

    fn set_directory(&self, directory: &Path) -> CoreResult<()> {
        self.lifecycle
            .ensure(&self.identifier, LifecycleState::Shutdown)?;
        *self.directory.write() = directory.to_path_buf();
        Ok(())
    }
}

impl<T: Record> DynPage for Page<T> {
    fn element_type(&self) -> ElementType {
        ElementType::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T> fmt::Debug for Page<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("identifier", &self.identifier)
            .field("format", &self.format)
            .field("state", &self.lifecycle.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use serde::{Deserialize, Serialize};
    use tempfile::{tempdir, TempDir};

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Settings {
        theme: String,
        font_size: u8,
    }

    fn page(dir: &TempDir, format: Format) -> Page<Settings> {
        let options = PageOptions::new("settings", || Settings {
            theme: "light".into(),
            font_size: 12,
        })
        .format(format);
        Page::new(options, dir.path().join("Pages/settings"), &DatabaseConfig::new())
    }

    #[test]
    fn read_requires_running() {
        let dir = tempdir().unwrap();
        let page = page(&dir, Format::Json);

        assert!(matches!(page.read(), Err(CoreError::InvalidState { .. })));
        assert!(matches!(
            page.write(&Settings::default()),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn unwritten_page_reads_constructor_value() {
        let dir = tempdir().unwrap();
        let page = page(&dir, Format::Json);
        page.startup().unwrap();

        assert_eq!(page.read().unwrap().theme, "light");
        assert!(!page.path().exists());
    }

    #[test]
    fn written_value_survives_restart() {
        for format in Format::ALL {
            let dir = tempdir().unwrap();
            let page = page(&dir, format);
            page.startup().unwrap();

            let dark = Settings {
                theme: "dark".into(),
                font_size: 14,
            };
            page.write(&dark).unwrap();
            page.shutdown().unwrap();

            page.startup().unwrap();
            assert_eq!(page.read().unwrap(), dark);
            assert!(page
                .path()
                .ends_with(format!("Content.{}", format.extension())));
        }
    }

    #[test]
    fn shutdown_gives_up_on_busy_content_file() {
        use fs2::FileExt;
        use std::time::{Duration, Instant};

        let dir = tempdir().unwrap();
        let config = DatabaseConfig::new().shutdown_timeout(Duration::from_millis(150));
        let page = Page::new(
            PageOptions::<Settings>::with_default("settings"),
            dir.path().join("Pages/settings"),
            &config,
        );
        page.startup().unwrap();
        page.write(&Settings::default()).unwrap();

        let holder = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(filedb_storage::fs::with_suffix(&page.path(), ".lock"))
            .unwrap();
        holder.try_lock_exclusive().unwrap();

        let started = Instant::now();
        page.shutdown().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(page.state(), LifecycleState::Shutdown);
        FileExt::unlock(&holder).unwrap();
    }

    #[test]
    fn undecodable_file_falls_back_to_constructor() {
        let dir = tempdir().unwrap();
        let page = page(&dir, Format::Json);
        page.startup().unwrap();
        fs::write(page.path(), b"not json").unwrap();

        assert_eq!(page.read().unwrap().font_size, 12);
    }

    #[test]
    fn empty_file_falls_back_to_constructor() {
        let dir = tempdir().unwrap();
        let page = page(&dir, Format::Cbor);
        page.startup().unwrap();
        fs::write(page.path(), b"").unwrap();

        assert_eq!(page.read().unwrap().theme, "light");
    }

    #[test]
    fn with_default_uses_default() {
        let dir = tempdir().unwrap();
        let page: Page<Settings> = Page::new(
            PageOptions::with_default("settings"),
            dir.path().join("Pages/settings"),
            &DatabaseConfig::new(),
        );
        page.startup().unwrap();

        assert_eq!(page.read().unwrap(), Settings::default());
    }
}
