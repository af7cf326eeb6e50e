use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use stagehand::artifact::urlsafe_token;
use stagehand::errors::{Result, StagehandError};
use stagehand::remote::{
    ArtifactRegistry, BoxFuture, ComputeGateway, EventTask, JobAccepted, JobRequest, NewArtifact,
    NewTask, ObjectRef, ObjectStore, RegisteredArtifact, Services, TaskEvent, TaskStatus,
    TaskTracker,
};

/// How threads created by the fake gateway behave when polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadBehaviour {
    /// Every poll reports the thread completed.
    Complete,
    /// Every poll reports a failed task in the thread.
    Fail,
    /// The thread never finishes.
    Pending,
}

/// Per-method call counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calls {
    pub request_task: usize,
    pub update_task: usize,
    pub thread_events: usize,
    pub exists: usize,
    pub get: usize,
    pub register: usize,
    pub upload: usize,
    pub list: usize,
    pub download: usize,
    pub submit: usize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.request_task
            + self.update_task
            + self.thread_events
            + self.exists
            + self.get
            + self.register
            + self.upload
            + self.list
            + self.download
            + self.submit
    }
}

#[derive(Debug)]
struct State {
    calls: Calls,
    next_id: usize,
    default_behaviour: ThreadBehaviour,
    thread_behaviour: HashMap<String, ThreadBehaviour>,
    reject_submissions: bool,
    reject_task_updates: bool,
    write_logs: bool,
    /// sri token -> registered artifacts
    registry: HashMap<String, Vec<RegisteredArtifact>>,
    /// (bucket, object) -> bytes
    objects: BTreeMap<(String, String), Vec<u8>>,
    submissions: Vec<(String, JobRequest)>,
    task_updates: Vec<(String, TaskStatus, String)>,
    registrations: Vec<NewArtifact>,
}

/// In-memory stand-in for all four remote services.
///
/// Clones share state, so a test can hand `services()` to the engine and
/// keep a handle to inspect what happened. Accepted jobs write one log
/// object under `artifacts/logs/<stage>/` in the run's bucket unless
/// disabled with [`FakeRemote::without_logs`].
#[derive(Debug, Clone)]
pub struct FakeRemote {
    state: Arc<Mutex<State>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    /// Accepts every job; every thread completes immediately.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                calls: Calls::default(),
                next_id: 0,
                default_behaviour: ThreadBehaviour::Complete,
                thread_behaviour: HashMap::new(),
                reject_submissions: false,
                reject_task_updates: false,
                write_logs: true,
                registry: HashMap::new(),
                objects: BTreeMap::new(),
                submissions: Vec::new(),
                task_updates: Vec::new(),
                registrations: Vec::new(),
            })),
        }
    }

    /// Behaviour of threads created from now on, and of unknown thread ids.
    pub fn with_threads(self, behaviour: ThreadBehaviour) -> Self {
        self.state.lock().unwrap().default_behaviour = behaviour;
        self
    }

    /// Override the behaviour of one thread id.
    pub fn set_thread(&self, thread_id: &str, behaviour: ThreadBehaviour) {
        self.state
            .lock()
            .unwrap()
            .thread_behaviour
            .insert(thread_id.to_string(), behaviour);
    }

    /// Gateways answer every submission with an HTTP-level failure.
    pub fn rejecting_submissions(self) -> Self {
        self.state.lock().unwrap().reject_submissions = true;
        self
    }

    /// The tracker accepts new tasks but fails every status update.
    pub fn rejecting_task_updates(self) -> Self {
        self.state.lock().unwrap().reject_task_updates = true;
        self
    }

    pub fn without_logs(self) -> Self {
        self.state.lock().unwrap().write_logs = false;
        self
    }

    /// Pre-register an artifact under its SRI string.
    pub fn register_existing(&self, sri: &str, uri: &str) {
        self.state
            .lock()
            .unwrap()
            .registry
            .entry(urlsafe_token(sri))
            .or_default()
            .push(RegisteredArtifact {
                uri: uri.to_string(),
                sri: Some(sri.to_string()),
            });
    }

    /// Put an object straight into the store.
    pub fn put_object(&self, bucket: &str, object: &str, contents: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((bucket.to_string(), object.to_string()), contents.to_vec());
    }

    pub fn services(&self) -> Services {
        Services {
            tracker: Arc::new(self.clone()),
            registry: Arc::new(self.clone()),
            store: Arc::new(self.clone()),
            gateway: Arc::new(self.clone()),
        }
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls = Calls::default();
    }

    /// `(url, request)` of every job posted, accepted or not.
    pub fn submissions(&self) -> Vec<(String, JobRequest)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn task_updates(&self) -> Vec<(String, TaskStatus, String)> {
        self.state.lock().unwrap().task_updates.clone()
    }

    pub fn registrations(&self) -> Vec<NewArtifact> {
        self.state.lock().unwrap().registrations.clone()
    }

    pub fn object_names(&self, bucket: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, o)| o.clone())
            .collect()
    }

    fn events_for(behaviour: ThreadBehaviour, thread_id: &str) -> Vec<TaskEvent> {
        let event = |status: &str, message: &str| TaskEvent {
            status: status.to_string(),
            message: Some(message.to_string()),
            task: Some(EventTask {
                task_id: format!("{thread_id}-worker"),
                run_id: None,
                project: None,
                caller: Some("fake-gateway".to_string()),
            }),
            timestamp: None,
        };

        match behaviour {
            ThreadBehaviour::Complete => vec![
                event("started", "job started"),
                event("completed", "job completed"),
            ],
            ThreadBehaviour::Fail => vec![
                event("started", "job started"),
                event("failed", "flake8 exited with status 1"),
            ],
            ThreadBehaviour::Pending => vec![event("started", "job started")],
        }
    }
}

impl TaskTracker for FakeRemote {
    fn request_task(&self, request: &NewTask) -> BoxFuture<'_, Result<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.request_task += 1;
        state.next_id += 1;
        let task_id = format!("task-{}-{}", request.project, state.next_id);
        Box::pin(async move { Ok(task_id) })
    }

    fn update_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: &str,
    ) -> BoxFuture<'_, Result<()>> {
        let mut state = self.state.lock().unwrap();
        state.calls.update_task += 1;
        state
            .task_updates
            .push((task_id.to_string(), status, message.to_string()));
        if state.reject_task_updates {
            let err = StagehandError::TaskTracker(format!("updating task {task_id}: 503"));
            return Box::pin(async move { Err(err) });
        }
        Box::pin(async { Ok(()) })
    }

    fn thread_events(&self, thread_id: &str) -> BoxFuture<'_, Result<Vec<TaskEvent>>> {
        let mut state = self.state.lock().unwrap();
        state.calls.thread_events += 1;
        let behaviour = state
            .thread_behaviour
            .get(thread_id)
            .copied()
            .unwrap_or(state.default_behaviour);
        let events = Self::events_for(behaviour, thread_id);
        Box::pin(async move { Ok(events) })
    }
}

impl ArtifactRegistry for FakeRemote {
    fn exists(&self, sri_urlsafe: &str) -> BoxFuture<'_, Result<bool>> {
        let mut state = self.state.lock().unwrap();
        state.calls.exists += 1;
        let found = state.registry.contains_key(sri_urlsafe);
        Box::pin(async move { Ok(found) })
    }

    fn get(&self, sri_urlsafe: &str) -> BoxFuture<'_, Result<Vec<RegisteredArtifact>>> {
        let mut state = self.state.lock().unwrap();
        state.calls.get += 1;
        let artifacts = state.registry.get(sri_urlsafe).cloned().unwrap_or_default();
        Box::pin(async move { Ok(artifacts) })
    }

    fn register(&self, artifact: &NewArtifact) -> BoxFuture<'_, Result<()>> {
        let mut state = self.state.lock().unwrap();
        state.calls.register += 1;
        state
            .registry
            .entry(urlsafe_token(&artifact.sri))
            .or_default()
            .push(RegisteredArtifact {
                uri: artifact.uri.clone(),
                sri: Some(artifact.sri.clone()),
            });
        state.registrations.push(artifact.clone());
        Box::pin(async { Ok(()) })
    }
}

impl ObjectStore for FakeRemote {
    fn upload(&self, bucket: &str, object: &str, local: &Path) -> BoxFuture<'_, Result<()>> {
        let mut state = self.state.lock().unwrap();
        state.calls.upload += 1;
        let result = std::fs::read(local)
            .map(|bytes| {
                state
                    .objects
                    .insert((bucket.to_string(), object.to_string()), bytes);
            })
            .map_err(StagehandError::from);
        Box::pin(async move { result })
    }

    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> BoxFuture<'_, Result<Vec<ObjectRef>>> {
        let mut state = self.state.lock().unwrap();
        state.calls.list += 1;
        let objects = state
            .objects
            .keys()
            .filter(|(b, name)| {
                b == bucket
                    && name.strip_prefix(prefix).is_some_and(|rest| {
                        recursive || !rest.trim_start_matches('/').contains('/')
                    })
            })
            .map(|(_, name)| ObjectRef {
                object_name: name.clone(),
            })
            .collect();
        Box::pin(async move { Ok(objects) })
    }

    fn download(
        &self,
        bucket: &str,
        object: &ObjectRef,
        local: &Path,
    ) -> BoxFuture<'_, Result<()>> {
        let mut state = self.state.lock().unwrap();
        state.calls.download += 1;
        let result = match state
            .objects
            .get(&(bucket.to_string(), object.object_name.clone()))
        {
            Some(bytes) => std::fs::write(local, bytes).map_err(StagehandError::from),
            None => Err(StagehandError::ObjectStore(format!(
                "no object {bucket}/{}",
                object.object_name
            ))),
        };
        Box::pin(async move { result })
    }

    fn uri(&self, bucket: &str, object: &str) -> String {
        format!("fake://{bucket}/{object}")
    }
}

impl ComputeGateway for FakeRemote {
    fn submit(&self, url: &str, request: &JobRequest) -> BoxFuture<'_, Result<JobAccepted>> {
        let mut state = self.state.lock().unwrap();
        state.calls.submit += 1;
        state.submissions.push((url.to_string(), request.clone()));

        if state.reject_submissions {
            let err = StagehandError::Other(anyhow::anyhow!("500 Internal Server Error for {url}"));
            return Box::pin(async move { Err(err) });
        }

        state.next_id += 1;
        let thread_id = format!("thread-{}", state.next_id);
        let behaviour = state.default_behaviour;
        state.thread_behaviour.insert(thread_id.clone(), behaviour);

        if state.write_logs {
            let object = format!("artifacts/logs/{}/{thread_id}.log", request.stage);
            let body = format!("{} output from {url}\n", request.stage);
            state
                .objects
                .insert((request.run_id.clone(), object), body.into_bytes());
        }

        Box::pin(async move { Ok(JobAccepted { thread_id }) })
    }
}
