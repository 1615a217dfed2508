#[derive(Debug, Clone)]
pub enum Progress {
    RunStart { max_iterations: u64 },
    IterationStart { index: usize },

    SimulationsStart { total_states: u64 },
    StateFinished { state: String, failed: bool },

    IterationFinish {
        index: usize,
        aggregate_divergence: Option<f64>,
    },
    RunFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
