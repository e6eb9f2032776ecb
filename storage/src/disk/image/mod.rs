//! Disk images: the per-format readers, and the caching/write-back layer
//! that turns any of them into a mountable disk.

pub mod adf;
pub mod dsk;
pub mod g64;
pub mod macintosh_img;
pub mod oric_mfm_dsk;
pub mod ssd;

use super::{HeadPosition, Track, TrackAddress};
use clocking::AsyncTaskQueue;
use log::error;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A disk image file, addressed by track. Implementations load lazily and
/// need not cache: the holder above them does that.
///
/// `store_track_at` runs on a background thread, only ever while the
/// holder's file mutex is held, so implementations may touch their file
/// freely within it.
pub trait DiskImage: Send {
    /// The number of discrete head positions the image models. Not
    /// necessarily a track count: positions may repeat tracks or hold
    /// nothing at all.
    fn maximum_head_position(&self) -> HeadPosition;

    fn head_count(&self) -> u8 {
        1
    }

    fn track_at(&mut self, address: TrackAddress) -> Option<Box<dyn Track>>;

    fn store_track_at(&mut self, _address: TrackAddress, _track: &mut dyn Track) {}

    fn is_read_only(&self) -> bool {
        true
    }
}

/// A mountable disk: what a [`Drive`](crate::disk::drive::Drive) actually
/// holds. Tracks handed out are independent readers; storing a track makes
/// it visible to subsequent reads immediately, with the underlying file
/// updated asynchronously.
pub trait Disk {
    fn maximum_head_position(&self) -> HeadPosition;
    fn head_count(&self) -> u8;
    fn track_at(&self, address: TrackAddress) -> Option<Box<dyn Track>>;
    fn set_track_at(&self, address: TrackAddress, track: Box<dyn Track>);
    fn is_read_only(&self) -> bool;
    fn flush_tracks(&self);
}

/// Wraps a [`DiskImage`] with a read-through track cache and a write-back
/// queue. The image mutex serialises all file access; the cache has its own
/// lock so reads of cached tracks never wait on the file.
pub struct DiskImageHolder<T: DiskImage + 'static> {
    image: Arc<Mutex<T>>,
    cache: Mutex<HashMap<TrackAddress, Box<dyn Track>>>,
    update_queue: AsyncTaskQueue,

    maximum_head_position: HeadPosition,
    head_count: u8,
    is_read_only: bool,
}

impl<T: DiskImage + 'static> DiskImageHolder<T> {
    #[must_use]
    pub fn new(image: T) -> Self {
        let maximum_head_position = image.maximum_head_position();
        let head_count = image.head_count();
        let is_read_only = image.is_read_only();
        DiskImageHolder {
            image: Arc::new(Mutex::new(image)),
            cache: Mutex::new(HashMap::new()),
            update_queue: AsyncTaskQueue::new(),
            maximum_head_position,
            head_count,
            is_read_only,
        }
    }
}

impl<T: DiskImage + 'static> Disk for DiskImageHolder<T> {
    fn maximum_head_position(&self) -> HeadPosition {
        self.maximum_head_position
    }

    fn head_count(&self) -> u8 {
        self.head_count
    }

    fn track_at(&self, address: TrackAddress) -> Option<Box<dyn Track>> {
        if let Some(track) = self.cache.lock().unwrap().get(&address) {
            return Some(track.clone_track());
        }

        let track = self.image.lock().unwrap().track_at(address)?;
        self.cache
            .lock()
            .unwrap()
            .insert(address, track.clone_track());
        Some(track)
    }

    fn set_track_at(&self, address: TrackAddress, track: Box<dyn Track>) {
        if self.is_read_only {
            error!("discarding write to read-only disk image at {address:?}");
            return;
        }

        self.cache
            .lock()
            .unwrap()
            .insert(address, track.clone_track());

        let image = Arc::clone(&self.image);
        let mut track = track;
        self.update_queue.enqueue(move || {
            image.lock().unwrap().store_track_at(address, track.as_mut());
        });
    }

    fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    fn flush_tracks(&self) {
        self.update_queue.flush();
    }
}

/// A disk consisting of one track repeated at every position; parsers and
/// tests use it to mount a track directly.
pub struct SingleTrackDisk {
    track: Mutex<Box<dyn Track>>,
}

impl SingleTrackDisk {
    #[must_use]
    pub fn new(track: Box<dyn Track>) -> Self {
        SingleTrackDisk {
            track: Mutex::new(track),
        }
    }
}

impl Disk for SingleTrackDisk {
    fn maximum_head_position(&self) -> HeadPosition {
        HeadPosition::new(1)
    }

    fn head_count(&self) -> u8 {
        1
    }

    fn track_at(&self, _address: TrackAddress) -> Option<Box<dyn Track>> {
        Some(self.track.lock().unwrap().clone_track())
    }

    fn set_track_at(&self, _address: TrackAddress, track: Box<dyn Track>) {
        *self.track.lock().unwrap() = track;
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn flush_tracks(&self) {}
}
