use std::{
	io::{self, Read, Seek, SeekFrom},
	sync::{mpsc, Arc},
	thread,
};

use super::{CompletionSink, StreamEngine, StreamRequest};
use crate::vfs::{FileSystem, OpenFlags, OpenMode};

type Job = (StreamRequest, CompletionSink);

/// A [`StreamEngine`] serving requests in order on one worker thread.
pub struct ThreadedStreamEngine {
	jobs: Option<mpsc::Sender<Job>>,
	worker: Option<thread::JoinHandle<()>>,
}

impl ThreadedStreamEngine {
	/// Spawn the worker, reading through `fs`
	pub fn new(fs: Arc<dyn FileSystem>) -> io::Result<ThreadedStreamEngine> {
		let (tx, rx) = mpsc::channel::<Job>();

		let worker = thread::Builder::new()
			.name("resfile-stream".into())
			.spawn(move || {
				for (request, sink) in rx {
					let result = ThreadedStreamEngine::read(fs.as_ref(), &request);
					if let Err(err) = &result {
						tracing::warn!("stream read of {} failed: {err}", request.path);
					}

					sink.complete(request.tag, result);
				}
			})?;

		Ok(ThreadedStreamEngine {
			jobs: Some(tx),
			worker: Some(worker),
		})
	}

	fn read(fs: &dyn FileSystem, request: &StreamRequest) -> io::Result<Vec<u8>> {
		let mut handle = fs.open(&request.path, OpenMode::Read, OpenFlags::default())?;
		handle.seek(SeekFrom::Start(request.offset))?;

		let mut buffer = vec![0u8; request.size];
		handle.read_exact(&mut buffer)?;

		Ok(buffer)
	}
}

impl StreamEngine for ThreadedStreamEngine {
	fn start_read(&self, request: StreamRequest, sink: CompletionSink) {
		let Some(jobs) = self.jobs.as_ref() else {
			sink.complete(request.tag, Err(io::Error::other("stream engine shut down")));
			return;
		};

		if let Err(mpsc::SendError((request, sink))) = jobs.send((request, sink)) {
			sink.complete(request.tag, Err(io::Error::other("stream worker exited")));
		}
	}
}

impl Drop for ThreadedStreamEngine {
	fn drop(&mut self) {
		// closing the channel ends the worker loop
		self.jobs.take();

		if let Some(worker) = self.worker.take() {
			if worker.join().is_err() {
				tracing::warn!("stream worker panicked");
			}
		}
	}
}
