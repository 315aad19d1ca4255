use crate::{ArtifactPaths, CaptureReport, CaptureRequest, Capturer, Metrics, ScreenshotError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One capture waiting for a worker, with the channel its result goes back on.
pub struct CaptureJob {
    pub request: CaptureRequest,
    pub paths: ArtifactPaths,
    reply: oneshot::Sender<Result<CaptureReport, ScreenshotError>>,
}

pub struct CaptureWorker {
    id: usize,
    capturer: Arc<dyn Capturer>,
    metrics: Metrics,
    is_running: Arc<AtomicBool>,
    processed_count: Arc<AtomicUsize>,
    error_count: Arc<AtomicUsize>,
}

impl CaptureWorker {
    pub fn new(id: usize, capturer: Arc<dyn Capturer>) -> Self {
        Self {
            id,
            capturer,
            metrics: Metrics::new(),
            is_running: Arc::new(AtomicBool::new(false)),
            processed_count: Arc::new(AtomicUsize::new(0)),
            error_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn run_with_shared_receiver(&self, jobs: Arc<Mutex<mpsc::Receiver<CaptureJob>>>) {
        debug!("Starting capture worker {}", self.id);
        self.is_running.store(true, Ordering::Relaxed);

        loop {
            let job = {
                let mut receiver = jobs.lock().await;
                receiver.recv().await
            };

            match job {
                Some(job) => self.process_job(job).await,
                None => break,
            }
        }

        self.is_running.store(false, Ordering::Relaxed);
        debug!("Capture worker {} stopped", self.id);
    }

    async fn process_job(&self, job: CaptureJob) {
        let CaptureJob {
            request,
            paths,
            reply,
        } = job;
        debug!("Worker {} capturing {}", self.id, request.describe());

        let result = self.capturer.capture(&request, &paths).await;

        match &result {
            Ok(report) => {
                self.processed_count.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_capture(report.duration, true);
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_capture(Duration::ZERO, false);
                warn!("Worker {} failed to capture {}: {}", self.id, request.url, e);
            }
        }

        if reply.send(result).is_err() {
            error!("Worker {} could not deliver result for {}", self.id, request.url);
        }
    }

    pub fn get_stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            is_running: self.is_running.load(Ordering::Relaxed),
            processed_count: self.processed_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }
}

impl Clone for CaptureWorker {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            capturer: self.capturer.clone(),
            metrics: self.metrics.clone(),
            is_running: self.is_running.clone(),
            processed_count: self.processed_count.clone(),
            error_count: self.error_count.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub id: usize,
    pub is_running: bool,
    pub processed_count: usize,
    pub error_count: usize,
}

/// Bounded pool of capture workers sharing one job queue.
///
/// At most `size` captures run at once. [`WorkerPool::submit`] waits for the
/// capture to finish, so a caller processing directives one after another
/// sees them complete in document order.
pub struct WorkerPool {
    workers: Vec<CaptureWorker>,
    job_sender: Option<mpsc::Sender<CaptureJob>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize, capturer: Arc<dyn Capturer>) -> Self {
        let size = size.max(1);
        let (job_sender, job_receiver) = mpsc::channel(size);
        let shared_receiver = Arc::new(Mutex::new(job_receiver));

        let workers: Vec<CaptureWorker> = (0..size)
            .map(|i| CaptureWorker::new(i, capturer.clone()))
            .collect();

        let handles = workers
            .iter()
            .map(|worker| {
                let worker = worker.clone();
                let rx = shared_receiver.clone();
                tokio::spawn(async move {
                    worker.run_with_shared_receiver(rx).await;
                })
            })
            .collect();

        info!("Started capture pool with {} worker(s)", size);
        Self {
            workers,
            job_sender: Some(job_sender),
            handles,
        }
    }

    /// Queue a capture and wait for its result.
    pub async fn submit(
        &self,
        request: CaptureRequest,
        paths: ArtifactPaths,
    ) -> Result<CaptureReport, ScreenshotError> {
        let sender = self.job_sender.as_ref().ok_or(ScreenshotError::PoolClosed)?;
        let (reply, result) = oneshot::channel();

        sender
            .send(CaptureJob {
                request,
                paths,
                reply,
            })
            .await
            .map_err(|_| ScreenshotError::PoolClosed)?;

        result.await.map_err(|_| ScreenshotError::PoolClosed)?
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn get_worker_stats(&self) -> Vec<WorkerStats> {
        self.workers.iter().map(|w| w.get_stats()).collect()
    }

    pub fn total_processed(&self) -> usize {
        self.workers.iter().map(|w| w.processed_count()).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.workers.iter().map(|w| w.error_count()).sum()
    }

    pub fn active_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_running()).count()
    }

    /// Close the queue and wait for every worker to finish its current job.
    pub async fn shutdown(&mut self) {
        self.job_sender.take();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Capture worker task failed: {}", e);
            }
        }
        debug!(
            processed = self.total_processed(),
            errors = self.total_errors(),
            "Capture pool stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCapturer;
    use crate::{ArtifactCache, ColorScheme, OutputFormat, StatusPolicy, Viewport};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    fn request(url: &str) -> CaptureRequest {
        CaptureRequest {
            url: url.to_string(),
            raw_target: url.to_string(),
            browser: "chromium".to_string(),
            viewport: Viewport {
                width: 480,
                height: 320,
            },
            device_scale_factor: 1,
            color_scheme: ColorScheme::Null,
            locale: None,
            timezone: None,
            headers: BTreeMap::new(),
            interactions: String::new(),
            context: String::new(),
            full_page: false,
            pdf: false,
            status_codes: None,
            status_policy: StatusPolicy::default(),
            format: OutputFormat::Png,
        }
    }

    /// Records the highest number of captures running at once.
    struct SlowCapturer {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Capturer for SlowCapturer {
        async fn capture(
            &self,
            _request: &CaptureRequest,
            _paths: &ArtifactPaths,
        ) -> Result<CaptureReport, ScreenshotError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(CaptureReport::default())
        }
    }

    #[tokio::test]
    async fn test_submit_returns_capture_result() {
        let mut mock = MockCapturer::new();
        mock.expect_capture()
            .times(2)
            .returning(|req, _| {
                if req.url.contains("broken") {
                    Err(ScreenshotError::PageError("net::ERR_CONNECTION_REFUSED".to_string()))
                } else {
                    Ok(CaptureReport {
                        status: Some(200),
                        ..Default::default()
                    })
                }
            });

        let mut pool = WorkerPool::new(1, Arc::new(mock));
        let cache = ArtifactCache::new("out");

        let ok = request("http://localhost/");
        let report = pool.submit(ok.clone(), cache.paths(&ok)).await.unwrap();
        assert_eq!(report.status, Some(200));

        let broken = request("http://localhost/broken");
        let err = pool.submit(broken.clone(), cache.paths(&broken)).await;
        assert!(matches!(err, Err(ScreenshotError::PageError(_))));

        assert_eq!(pool.total_processed(), 1);
        assert_eq!(pool.total_errors(), 1);

        pool.shutdown().await;
        assert_eq!(pool.active_workers(), 0);
        assert!(matches!(
            pool.submit(ok.clone(), cache.paths(&ok)).await,
            Err(ScreenshotError::PoolClosed)
        ));
    }

    #[tokio::test]
    async fn test_pool_size_bounds_concurrency() {
        let capturer = Arc::new(SlowCapturer {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let pool = Arc::new(WorkerPool::new(2, capturer.clone()));
        let cache = ArtifactCache::new("out");

        let submissions = (0..6).map(|i| {
            let pool = pool.clone();
            let req = request(&format!("http://localhost/{i}"));
            let paths = cache.paths(&req);
            async move { pool.submit(req, paths).await }
        });
        let results = futures::future::join_all(submissions).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(capturer.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.total_processed(), 6);
    }
}
