pub mod stages;

pub use stages::{
    FetchStage, FetchTask, RecognizeStage, RecognizeTask, RunStats, UpdateStage, UpdateTask,
};
