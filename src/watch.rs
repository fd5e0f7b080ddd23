//! Filesystem watching for rebuild loops. Package directories are
//! registered as they are resolved; [`WatchSet::wait_for_change`] blocks
//! until a relevant source or script file changes.

use std::path::Path;
use std::sync::mpsc::{channel, Receiver};
use std::thread;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use crate::error::{Error, Result};
use crate::package::{SCRIPT_SUFFIX, SOURCE_SUFFIX};
use crate::session::Options;

pub struct WatchSet {
    watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
}

impl WatchSet {
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();
        let watcher = notify::recommended_watcher(tx)
            .map_err(|err| Error::internal(format!("cannot create filesystem watcher: {err}")))?;
        Ok(Self {
            watcher,
            events: rx,
        })
    }

    /// Registers a package directory. Failures are ignored; virtual
    /// packages have no directory on disk to watch.
    pub fn add(&mut self, dir: &Path) {
        if let Err(err) = self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            debug!(dir = %dir.display(), error = %err, "watch registration failed");
        }
    }

    /// Blocks until a create/write/remove/rename event arrives for a
    /// non-hidden source or script file. Watcher errors are reported and
    /// end the wait; they do not abort the embedding process.
    pub fn wait_for_change(self, options: &Options) {
        options.print_success("watching for changes...\n");
        loop {
            match self.events.recv() {
                Ok(Ok(event)) => {
                    if !relevant(&event) {
                        continue;
                    }
                    let name = event
                        .paths
                        .first()
                        .map(|path| path.display().to_string())
                        .unwrap_or_default();
                    options.print_success(&format!("change detected: {name}\n"));
                    break;
                }
                Ok(Err(err)) => {
                    options.print_error(&format!("watcher error: {err}\n"));
                    break;
                }
                Err(_) => break,
            }
        }

        // Drain remaining events on a background thread so dropping the
        // watcher cannot deadlock on a full channel.
        let WatchSet { watcher, events } = self;
        thread::spawn(move || {
            for _event in events.iter() {}
        });
        drop(watcher);
    }
}

fn relevant(event: &Event) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    event.paths.iter().any(|path| {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        !name.starts_with('.')
            && (name.ends_with(SOURCE_SUFFIX) || name.ends_with(SCRIPT_SUFFIX))
    })
}
