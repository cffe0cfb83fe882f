//! Windowless surface: frames are only traced, keys come from stdin.

use std::collections::HashMap;
use std::io::BufRead;
use std::thread;

use color_eyre::Result;
use flume::{Receiver, TryRecvError};
use tracing::{debug, trace};

use super::{DisplayImage, DisplaySurface};

pub struct HeadlessDisplay {
    keys: Receiver<char>,
    shown: HashMap<String, u64>,
}

impl HeadlessDisplay {
    /// Read keys line-wise from stdin on a helper thread.
    pub fn stdin() -> Self {
        let (tx, rx) = flume::unbounded();
        thread::Builder::new()
            .name("stdin-keys".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    for key in line.chars() {
                        if tx.send(key).is_err() {
                            return;
                        }
                    }
                }
                debug!("stdin closed, no more keys");
            })
            .ok();
        Self::with_keys(rx)
    }

    /// Keys from any channel; used for scripted runs.
    pub fn with_keys(keys: Receiver<char>) -> Self {
        Self {
            keys,
            shown: HashMap::new(),
        }
    }

    /// Frames shown so far for `stream`
    pub fn shown(&self, stream: &str) -> u64 {
        self.shown.get(stream).copied().unwrap_or(0)
    }
}

impl DisplaySurface for HeadlessDisplay {
    fn show(&mut self, stream: &str, image: &DisplayImage) -> Result<()> {
        trace!(stream, width = image.width, height = image.height, "show");
        *self.shown.entry(stream.to_string()).or_default() += 1;
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        match self.keys.try_recv() {
            Ok(key) => Ok(Some(key)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_shows_and_drains_keys() {
        let (tx, rx) = flume::unbounded();
        let mut d = HeadlessDisplay::with_keys(rx);
        tx.send('c').unwrap();
        assert_eq!(d.poll_key().unwrap(), Some('c'));
        assert_eq!(d.poll_key().unwrap(), None);
        d.show("rgb", &DisplayImage::gray(1, 1, vec![0])).unwrap();
        assert_eq!(d.shown("rgb"), 1);
        assert_eq!(d.shown("left"), 0);
    }
}
