//! Target section of the agency: supervision job queues and server cleanup lists

use super::exists::StateExists;
use super::servers::ServerList;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

pub type JobID = String;
pub type Jobs = BTreeMap<JobID, Job>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Target {
    #[serde(rename = "ToDo", default)]
    pub job_todo: Jobs,

    #[serde(rename = "Pending", default)]
    pub job_pending: Jobs,

    #[serde(rename = "Failed", default)]
    pub job_failed: Jobs,

    #[serde(rename = "Finished", default)]
    pub job_finished: Jobs,

    #[serde(rename = "CleanedServers", default)]
    pub cleaned_servers: ServerList,

    #[serde(rename = "ToBeCleanedServers", default)]
    pub to_be_cleaned_servers: ServerList,

    #[serde(rename = "HotBackup", default)]
    pub hot_backup: TargetHotBackup,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetHotBackup {
    #[serde(rename = "Create", default)]
    pub create: StateExists,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default)]
    pub job_id: JobID,

    #[serde(rename = "type", default)]
    pub job_type: String,

    #[serde(default)]
    pub server: Option<String>,

    #[serde(default)]
    pub creator: Option<String>,

    #[serde(default)]
    pub time_created: Option<String>,
}

/// Queue a job currently resides in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    ToDo,
    Pending,
    Failed,
    Finished,
    Unknown,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::ToDo => write!(f, "todo"),
            JobPhase::Pending => write!(f, "pending"),
            JobPhase::Failed => write!(f, "failed"),
            JobPhase::Finished => write!(f, "finished"),
            JobPhase::Unknown => write!(f, "unknown"),
        }
    }
}

impl Target {
    /// Locate a job across the four queues
    pub fn get_job(&self, id: &str) -> (Job, JobPhase) {
        let queues = [
            (&self.job_todo, JobPhase::ToDo),
            (&self.job_pending, JobPhase::Pending),
            (&self.job_failed, JobPhase::Failed),
            (&self.job_finished, JobPhase::Finished),
        ];

        for (jobs, phase) in queues {
            if let Some(job) = jobs.get(id) {
                return (job.clone(), phase);
            }
        }

        (Job::default(), JobPhase::Unknown)
    }
}
