//! Block requests, their in-flight bookkeeping and the future a submitter awaits.

use crate::{SECTOR_SIZE, error::Error, fmt};
use alloc::{collections::VecDeque, sync::Arc, vec, vec::Vec};
use atomic_waker::AtomicWaker;
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use slab::Slab;

/// Direction of a block request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Fill the request's segments from the device.
    Read,
    /// Write the request's segments to the device.
    Write,
}

/// A block read or write made of one or more memory segments.
///
/// Each segment must be a whole number of sectors. Segments are transferred back to back starting
/// at [`sector`](Request::sector). A completed request is handed back through its [`IoFuture`],
/// with read data copied into the segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub(crate) direction: Direction,
    pub(crate) sector: u64,
    pub(crate) segments: Vec<Vec<u8>>,
}

impl Request {
    /// Read into the given segments. Their current contents are overwritten.
    pub fn read(sector: u64, segments: Vec<Vec<u8>>) -> Self {
        Self {
            direction: Direction::Read,
            sector,
            segments,
        }
    }

    /// Read `len` bytes into a single zeroed segment.
    pub fn read_len(sector: u64, len: usize) -> Self {
        Self::read(sector, vec![vec![0u8; len]])
    }

    /// Write the given segments.
    pub fn write(sector: u64, segments: Vec<Vec<u8>>) -> Self {
        Self {
            direction: Direction::Write,
            sector,
            segments,
        }
    }

    /// Request direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// First sector.
    pub fn sector(&self) -> u64 {
        self.sector
    }

    /// Total length of all segments in bytes.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    /// Whether the request transfers no data at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The request's segments.
    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    /// Take the segments out of the request.
    pub fn into_segments(self) -> Vec<Vec<u8>> {
        self.segments
    }

    /// All segments joined into one buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.segments.concat()
    }

    /// Number of sectors the request covers.
    pub fn sector_count(&self) -> u64 {
        (self.len() / SECTOR_SIZE) as u64
    }

    /// Last sector the request touches, or `None` if it runs past the end of a 64 bit address.
    pub(crate) fn last_sector(&self) -> Option<u64> {
        self.sector.checked_add(self.sector_count().saturating_sub(1))
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.is_empty() || self.segments.iter().any(|s| s.len() % SECTOR_SIZE != 0) {
            return Err(Error::InvalidRequest);
        }

        Ok(())
    }
}

/// Result slot shared between a [`Buf`] and its [`IoFuture`].
#[derive(Debug, Default)]
struct Completion {
    waker: AtomicWaker,
    result: spin::Mutex<Option<Result<Request, Error>>>,
}

impl Completion {
    fn complete(&self, result: Result<Request, Error>) {
        {
            let mut slot = self.result.lock();

            fmt::debug_assert!(slot.is_none(), "request completed twice");

            *slot = Some(result);
        }

        self.waker.wake();
    }
}

/// Resolves when the target has acknowledged every frame of a request, or the request failed.
///
/// The request is returned on success so read data and buffers can be reused.
#[derive(Debug)]
#[must_use = "a request's result is only available through its future"]
pub struct IoFuture {
    completion: Arc<Completion>,
}

impl IoFuture {
    /// Whether the request has finished. Polling will not return `Pending` once this is true.
    pub fn is_complete(&self) -> bool {
        self.completion.result.lock().is_some()
    }
}

impl Future for IoFuture {
    type Output = Result<Request, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.completion.waker.register(cx.waker());

        match self.completion.result.lock().take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

/// Per-request transfer state while a request is queued or in flight.
#[derive(Debug)]
pub(crate) struct Buf {
    pub(crate) request: Request,
    completion: Arc<Completion>,
    /// Next sector to issue a command for.
    pub(crate) sector: u64,
    /// Bytes not yet assigned to a frame.
    pub(crate) resid: usize,
    /// Segment currently being sliced.
    pub(crate) segment: usize,
    /// Offset into the current segment.
    pub(crate) seg_offset: usize,
    /// Bytes left in the current segment.
    pub(crate) seg_resid: usize,
    /// Frames sent for this buf that have not been answered.
    pub(crate) frames_out: usize,
    /// Bytes acknowledged by the target.
    pub(crate) acked: usize,
    /// Set when any frame of this buf reported an ATA error.
    pub(crate) failed: bool,
    /// Submission time, in microseconds.
    pub(crate) submitted_at: u64,
}

impl Buf {
    pub(crate) fn new(request: Request, now: u64) -> (Self, IoFuture) {
        let completion = Arc::new(Completion::default());

        let mut buf = Self {
            sector: request.sector,
            resid: request.len(),
            segment: 0,
            seg_offset: 0,
            seg_resid: 0,
            frames_out: 0,
            acked: 0,
            failed: false,
            submitted_at: now,
            completion: Arc::clone(&completion),
            request,
        };

        buf.seek_segment(0);

        (buf, IoFuture { completion })
    }

    /// Move the cursor to the first non-empty segment at or after `segment`.
    fn seek_segment(&mut self, segment: usize) {
        self.segment = segment;
        self.seg_offset = 0;
        self.seg_resid = 0;

        while let Some(seg) = self.request.segments.get(self.segment) {
            if !seg.is_empty() {
                self.seg_resid = seg.len();

                break;
            }

            self.segment += 1;
        }
    }

    /// Advance the cursor by `bcnt` bytes, which must not cross a segment boundary.
    pub(crate) fn advance(&mut self, bcnt: usize) {
        fmt::debug_assert!(bcnt <= self.seg_resid && bcnt <= self.resid);

        self.sector = self.sector.saturating_add((bcnt / SECTOR_SIZE) as u64);
        self.resid -= bcnt;
        self.seg_offset += bcnt;
        self.seg_resid -= bcnt;

        if self.seg_resid == 0 && self.resid > 0 {
            self.seek_segment(self.segment + 1);
        }
    }

    /// All data has been assigned to frames and every frame has been answered.
    pub(crate) fn is_done(&self) -> bool {
        self.resid == 0 && self.frames_out == 0
    }

    /// Signal the submitter. Fails the request if any frame reported an error.
    pub(crate) fn complete(self) {
        let result = if self.failed {
            Err(Error::Io)
        } else {
            fmt::debug_assert!(self.acked == self.request.len());

            Ok(self.request)
        };

        self.completion.complete(result);
    }

    /// Signal the submitter with an I/O error.
    pub(crate) fn fail(self) {
        self.completion.complete(Err(Error::Io));
    }
}

/// A device's bufs: those waiting to be sliced, the one being sliced and those with frames
/// outstanding.
#[derive(Debug)]
pub(crate) struct BufQueue {
    bufs: Slab<Buf>,
    pending: VecDeque<usize>,
    in_process: Option<usize>,
    limit: usize,
}

impl BufQueue {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            bufs: Slab::new(),
            pending: VecDeque::new(),
            in_process: None,
            limit,
        }
    }

    /// Queue a buf, giving it back if the queue is at its limit.
    pub(crate) fn enqueue(&mut self, buf: Buf) -> Result<usize, Buf> {
        if self.bufs.len() >= self.limit {
            return Err(buf);
        }

        let key = self.bufs.insert(buf);

        self.pending.push_back(key);

        Ok(key)
    }

    /// The buf that should get the next frame, promoting the head of the pending queue if no buf
    /// is being sliced.
    pub(crate) fn next_work(&mut self) -> Option<usize> {
        if self.in_process.is_none() {
            self.in_process = self.pending.pop_front();
        }

        self.in_process
    }

    /// The in-process buf has had all of its data assigned to frames.
    pub(crate) fn finish_in_process(&mut self) {
        self.in_process = None;
    }

    pub(crate) fn get_mut(&mut self, key: usize) -> Option<&mut Buf> {
        self.bufs.get_mut(key)
    }

    pub(crate) fn remove(&mut self, key: usize) -> Option<Buf> {
        if self.in_process == Some(key) {
            self.in_process = None;
        }

        self.pending.retain(|pending| *pending != key);

        self.bufs.try_remove(key)
    }

    /// Remove every buf, whatever its state.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Buf> + '_ {
        self.pending.clear();
        self.in_process = None;

        self.bufs.drain()
    }

    pub(crate) fn len(&self) -> usize {
        self.bufs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future;

    #[test]
    fn validation() {
        assert_eq!(Request::read_len(0, 0).validate(), Err(Error::InvalidRequest));
        assert_eq!(Request::read_len(0, 100).validate(), Err(Error::InvalidRequest));
        assert_eq!(
            Request::write(0, vec![vec![0; 512], vec![0; 3]]).validate(),
            Err(Error::InvalidRequest)
        );
        assert_eq!(Request::read_len(0, 4096).validate(), Ok(()));
    }

    #[test]
    fn last_sector() {
        let request = Request::read(10, vec![vec![0; 1024], vec![0; 512]]);

        assert_eq!(request.sector_count(), 3);
        assert_eq!(request.last_sector(), Some(12));

        assert_eq!(Request::read_len(u64::MAX, 512).last_sector(), Some(u64::MAX));
        assert_eq!(Request::read_len(u64::MAX, 1024).last_sector(), None);
    }

    #[test]
    fn cursor_skips_empty_segments() {
        let request = Request::write(0, vec![vec![], vec![1; 1024], vec![], vec![2; 512]]);

        let (mut buf, _fut) = Buf::new(request, 0);

        assert_eq!((buf.segment, buf.seg_resid), (1, 1024));

        buf.advance(1024);

        assert_eq!((buf.segment, buf.seg_offset, buf.seg_resid), (3, 0, 512));
        assert_eq!(buf.sector, 2);

        buf.advance(512);

        assert_eq!(buf.resid, 0);
        assert_eq!(buf.sector, 3);
    }

    #[test]
    fn completion_resolves_future() {
        let (mut buf, fut) = Buf::new(Request::read_len(0, 512), 0);

        assert!(!fut.is_complete());

        buf.advance(512);
        buf.acked = 512;
        buf.complete();

        assert!(fut.is_complete());

        let request = future::block_on(fut).unwrap();

        assert_eq!(request.len(), 512);
    }

    #[test]
    fn failure() {
        let (buf, fut) = Buf::new(Request::read_len(0, 512), 0);

        buf.fail();

        assert_eq!(future::block_on(fut), Err(Error::Io));
    }

    #[test]
    fn queue_limit() {
        let mut queue = BufQueue::new(2);

        let (a, _fa) = Buf::new(Request::read_len(0, 512), 0);
        let (b, _fb) = Buf::new(Request::read_len(1, 512), 0);
        let (c, _fc) = Buf::new(Request::read_len(2, 512), 0);

        let a = queue.enqueue(a).unwrap();
        let _b = queue.enqueue(b).unwrap();

        assert!(queue.enqueue(c).is_err());

        assert_eq!(queue.next_work(), Some(a));
        // Still slicing `a`
        assert_eq!(queue.next_work(), Some(a));

        queue.finish_in_process();

        assert_ne!(queue.next_work(), Some(a));
    }

    #[test]
    fn drain_everything() {
        let mut queue = BufQueue::new(8);

        let futs = (0..3)
            .map(|sector| {
                let (buf, fut) = Buf::new(Request::read_len(sector, 512), 0);

                queue.enqueue(buf).unwrap();

                fut
            })
            .collect::<Vec<_>>();

        queue.next_work();

        for buf in queue.drain() {
            buf.fail();
        }

        assert_eq!(queue.len(), 0);
        assert_eq!(queue.next_work(), None);

        for fut in futs {
            assert_eq!(future::block_on(fut), Err(Error::Io));
        }
    }
}
