//! `TraceSource` — replays a file as a stream of fixed-size items.
//!
//! The file is cut into `chunk_size` byte chunks (the last one may be
//! shorter); chunk `n` becomes item `n`. An I/O error mid-file ends the
//! stream and is logged.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use gdriver_core::constants::MAX_ITEM_SIZE;
use gdriver_core::item::WorkItem;
use gdriver_core::source::WorkSource;

#[derive(Debug)]
pub struct TraceSource {
    path: PathBuf,
    reader: BufReader<File>,
    chunk_size: usize,
    next_id: u64,
    done: bool,
}

impl TraceSource {
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> io::Result<Self> {
        if chunk_size == 0 || chunk_size > MAX_ITEM_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("chunk size must be in 1..={}", MAX_ITEM_SIZE),
            ));
        }
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
            chunk_size,
            next_id: 0,
            done: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_chunk(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(self.chunk_size)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        (&mut self.reader)
            .take(self.chunk_size as u64)
            .read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl WorkSource for TraceSource {
    fn next_item(&mut self) -> Option<WorkItem> {
        if self.done {
            return None;
        }
        match self.read_chunk() {
            Ok(buf) if buf.is_empty() => {
                self.done = true;
                None
            }
            Ok(buf) => {
                let id = self.next_id;
                self.next_id += 1;
                Some(WorkItem::new(id, buf))
            }
            Err(e) => {
                tracing::error!(trace = %self.path.display(), error = %e, "trace read failed, ending work");
                self.done = true;
                None
            }
        }
    }

    fn reset(&mut self) -> bool {
        match self.reader.seek(SeekFrom::Start(0)) {
            Ok(_) => {
                self.next_id = 0;
                self.done = false;
                true
            }
            Err(e) => {
                tracing::warn!(trace = %self.path.display(), error = %e, "trace rewind failed");
                false
            }
        }
    }
}
