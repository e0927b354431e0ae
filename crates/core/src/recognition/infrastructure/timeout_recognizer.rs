use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::recognition::domain::face_recognizer::{FaceRecognizer, Prediction};
use crate::shared::frame::Frame;

type SendError = Box<dyn std::error::Error + Send + Sync>;

enum Request {
    Predict(u64, Frame),
    Reload(u64),
}

enum Reply {
    Predicted(Prediction),
    Reloaded(usize),
}

/// Runs a recognizer on a dedicated thread and bounds each prediction by a
/// timeout.
///
/// A prediction that outlives the timeout is reported as an error; its late
/// answer is dropped when it eventually arrives. Reloads wait without a
/// timeout since rebuilding a gallery is expected to be slow.
pub struct TimeoutRecognizer {
    request_tx: Option<Sender<Request>>,
    reply_rx: Receiver<(u64, Result<Reply, SendError>)>,
    timeout: Duration,
    next_seq: u64,
    worker: Option<JoinHandle<()>>,
}

impl TimeoutRecognizer {
    pub fn new(inner: Box<dyn FaceRecognizer>, timeout: Duration) -> Self {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<Request>();
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded();
        let worker = spawn_worker(inner, request_rx, reply_tx);
        Self {
            request_tx: Some(request_tx),
            reply_rx,
            timeout,
            next_seq: 0,
            worker: Some(worker),
        }
    }

    fn send(
        &mut self,
        make: impl FnOnce(u64) -> Request,
    ) -> Result<u64, Box<dyn std::error::Error>> {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.request_tx
            .as_ref()
            .ok_or("recognizer worker is gone")?
            .send(make(seq))
            .map_err(|_| "recognizer worker is gone")?;
        Ok(seq)
    }

    fn await_reply(
        &self,
        seq: u64,
        timeout: Option<Duration>,
    ) -> Result<Reply, Box<dyn std::error::Error>> {
        loop {
            let (reply_seq, result) = match timeout {
                Some(t) => self.reply_rx.recv_timeout(t).map_err(|e| match e {
                    RecvTimeoutError::Timeout => {
                        format!("recognition timed out after {} ms", t.as_millis())
                    }
                    RecvTimeoutError::Disconnected => "recognizer worker is gone".to_string(),
                })?,
                None => self
                    .reply_rx
                    .recv()
                    .map_err(|_| "recognizer worker is gone")?,
            };
            if reply_seq == seq {
                return result.map_err(|e| -> Box<dyn std::error::Error> { e });
            }
            log::debug!("Dropping stale recognition reply #{reply_seq}");
        }
    }
}

impl FaceRecognizer for TimeoutRecognizer {
    fn predict(&mut self, face: &Frame) -> Result<Prediction, Box<dyn std::error::Error>> {
        let seq = self.send(|seq| Request::Predict(seq, face.clone()))?;
        match self.await_reply(seq, Some(self.timeout))? {
            Reply::Predicted(prediction) => Ok(prediction),
            Reply::Reloaded(_) => Err("unexpected reply from recognizer worker".into()),
        }
    }

    fn reload(&mut self) -> Result<usize, Box<dyn std::error::Error>> {
        let seq = self.send(Request::Reload)?;
        match self.await_reply(seq, None)? {
            Reply::Reloaded(count) => Ok(count),
            Reply::Predicted(_) => Err("unexpected reply from recognizer worker".into()),
        }
    }
}

impl Drop for TimeoutRecognizer {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop. A worker stuck in
        // a hung prediction is left detached.
        self.request_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }
}

fn spawn_worker(
    mut inner: Box<dyn FaceRecognizer>,
    request_rx: Receiver<Request>,
    reply_tx: Sender<(u64, Result<Reply, SendError>)>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for request in request_rx {
            let (seq, result) = match request {
                Request::Predict(seq, face) => (
                    seq,
                    inner
                        .predict(&face)
                        .map(Reply::Predicted)
                        .map_err(|e| -> SendError { e.to_string().into() }),
                ),
                Request::Reload(seq) => (
                    seq,
                    inner
                        .reload()
                        .map(Reply::Reloaded)
                        .map_err(|e| -> SendError { e.to_string().into() }),
                ),
            };
            if reply_tx.send((seq, result)).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sleeps for each scripted delay before answering with the call number.
    struct SlowRecognizer {
        delays: Vec<Duration>,
        calls: usize,
    }

    impl FaceRecognizer for SlowRecognizer {
        fn predict(&mut self, _face: &Frame) -> Result<Prediction, Box<dyn std::error::Error>> {
            self.calls += 1;
            let delay = self.delays.get(self.calls - 1).copied().unwrap_or_default();
            std::thread::sleep(delay);
            Ok(Prediction {
                label: format!("call{}", self.calls),
                raw_confidence: 0.9,
                normalized_confidence: 90.0,
            })
        }

        fn reload(&mut self) -> Result<usize, Box<dyn std::error::Error>> {
            Ok(3)
        }
    }

    struct BrokenRecognizer;

    impl FaceRecognizer for BrokenRecognizer {
        fn predict(&mut self, _face: &Frame) -> Result<Prediction, Box<dyn std::error::Error>> {
            Err("bad crop".into())
        }
    }

    fn recognizer(delays_ms: &[u64]) -> TimeoutRecognizer {
        let inner = SlowRecognizer {
            delays: delays_ms.iter().copied().map(Duration::from_millis).collect(),
            calls: 0,
        };
        TimeoutRecognizer::new(Box::new(inner), Duration::from_millis(200))
    }

    fn face() -> Frame {
        Frame::new(vec![0; 2 * 2 * 3], 2, 2, 3, 0)
    }

    #[test]
    fn test_fast_prediction_passes_through() {
        let mut rec = recognizer(&[0]);
        assert_eq!(rec.predict(&face()).unwrap().label, "call1");
    }

    #[test]
    fn test_slow_prediction_times_out() {
        let mut rec = recognizer(&[600]);
        let err = rec.predict(&face()).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_late_reply_is_not_mistaken_for_next_answer() {
        let mut rec = recognizer(&[400, 0]);
        assert!(rec.predict(&face()).is_err());
        // The second request queues behind the first; its answer must be the
        // second call's, not the stale first one.
        assert_eq!(rec.predict(&face()).unwrap().label, "call2");
    }

    #[test]
    fn test_inner_error_is_forwarded() {
        let mut rec = TimeoutRecognizer::new(Box::new(BrokenRecognizer), Duration::from_secs(1));
        assert_eq!(rec.predict(&face()).unwrap_err().to_string(), "bad crop");
    }

    #[test]
    fn test_reload_is_forwarded() {
        let mut rec = recognizer(&[]);
        assert_eq!(rec.reload().unwrap(), 3);
    }

    #[test]
    fn test_reload_unsupported_by_inner() {
        let mut rec = TimeoutRecognizer::new(Box::new(BrokenRecognizer), Duration::from_secs(1));
        assert!(rec.reload().is_err());
    }
}
