use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::restart::{RestartState, restart_file_name, save_restart};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Failed,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
        }
    }
}

/// Contact status of one slave node in the active-set report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactNodeState {
    Inactive,
    /// Active, frictionless.
    Active,
    Stick,
    Slip,
}

impl ContactNodeState {
    pub fn as_str(self) -> &'static str {
        match self {
            ContactNodeState::Inactive => "inactive",
            ContactNodeState::Active => "active",
            ContactNodeState::Stick => "stick",
            ContactNodeState::Slip => "slip",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactNodeRecord {
    pub node: usize,
    pub state: ContactNodeState,
    pub weighted_gap: f64,
    pub normal_multiplier: f64,
    pub tangential_multiplier: f64,
}

/// Scalar stress/strain measure of one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRecord {
    pub element: usize,
    pub stress: Option<f64>,
    pub strain: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedField {
    pub name: String,
    pub values: Vec<f64>,
}

impl NamedField {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Everything written for one accepted time step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepRecord {
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    pub newton_iterations: usize,
    pub active_set_steps: usize,
    pub active_set_converged: bool,
    /// Nodal fields; empty when the results cadence skipped this step.
    pub fields: Vec<NamedField>,
    pub elements: Vec<ElementRecord>,
    pub contact: Vec<ContactNodeRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_name: String,
    pub analysis_type: String,
    pub num_nodes: usize,
    pub num_elements: usize,
    pub num_dofs: usize,
    pub steps_completed: usize,
    pub started: String,
    pub finished: String,
    pub status: JobStatus,
    pub message: String,
}

/// Appends step records to `<job>.dat`, `<job>.sta` and `<job>.cnt`
/// inside one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultWriter {
    job_name: String,
    dir: PathBuf,
    dat_path: PathBuf,
    sta_path: PathBuf,
    contact_path: PathBuf,
}

impl ResultWriter {
    /// Create the output directory and truncate the result files.
    pub fn create(dir: impl AsRef<Path>, job_name: impl Into<String>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let job_name = job_name.into();

        let writer = Self {
            dat_path: dir.join(format!("{job_name}.dat")),
            sta_path: dir.join(format!("{job_name}.sta")),
            contact_path: dir.join(format!("{job_name}.cnt")),
            job_name,
            dir,
        };

        fs::write(
            &writer.dat_path,
            format!("*CDYN DAT RESULTS\nJOB: {}\n", writer.job_name),
        )?;
        fs::write(
            &writer.sta_path,
            " STEP  ITER  ASET  CONV        TIME          DT\n",
        )?;
        fs::write(
            &writer.contact_path,
            format!("*CDYN ACTIVE SET REPORT\nJOB: {}\n", writer.job_name),
        )?;
        Ok(writer)
    }

    pub fn dat_path(&self) -> &Path {
        &self.dat_path
    }

    pub fn sta_path(&self) -> &Path {
        &self.sta_path
    }

    pub fn contact_path(&self) -> &Path {
        &self.contact_path
    }

    pub fn write_step(&self, record: &StepRecord) -> Result<()> {
        append(
            &self.sta_path,
            &format!(
                "{:5} {:5} {:5} {:>5} {:11.4e} {:11.4e}\n",
                record.step,
                record.newton_iterations,
                record.active_set_steps,
                if record.active_set_converged { "yes" } else { "no" },
                record.time,
                record.dt
            ),
        )?;

        if !record.fields.is_empty() || !record.elements.is_empty() {
            append(&self.dat_path, &format_dat_block(record))?;
        }
        if !record.contact.is_empty() {
            append(&self.contact_path, &format_contact_block(record))?;
        }
        tracing::debug!(step = record.step, job = %self.job_name, "step results written");
        Ok(())
    }

    /// Write a restart file next to the results and return its path.
    pub fn write_restart(&self, state: &RestartState) -> Result<PathBuf> {
        let path = self.dir.join(restart_file_name(&self.job_name, state.step));
        save_restart(&path, state)?;
        Ok(path)
    }

    /// Append the final job summary to the status file.
    pub fn finish(&self, report: &JobReport) -> Result<()> {
        append(&self.sta_path, &format_job_report(report))
    }
}

fn format_dat_block(record: &StepRecord) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "\n STEP {} TIME {:.6e} (iterations {})",
        record.step, record.time, record.newton_iterations
    );
    for field in &record.fields {
        let _ = writeln!(body, " {} ({} entries)", field.name, field.values.len());
        for (dof, value) in field.values.iter().enumerate() {
            let _ = writeln!(body, "{dof:8} {value:15.6e}");
        }
    }
    if !record.elements.is_empty() {
        let _ = writeln!(body, " element results   stress          strain");
        for element in &record.elements {
            let _ = writeln!(
                body,
                "{:8} {:>15} {:>15}",
                element.element,
                format_optional(element.stress),
                format_optional(element.strain)
            );
        }
    }
    body
}

fn format_contact_block(record: &StepRecord) -> String {
    let active = record
        .contact
        .iter()
        .filter(|node| node.state != ContactNodeState::Inactive)
        .count();
    let mut body = String::new();
    let _ = writeln!(
        body,
        "\n STEP {} TIME {:.6e} ACTIVE {} / {}",
        record.step,
        record.time,
        active,
        record.contact.len()
    );
    for node in &record.contact {
        let _ = writeln!(
            body,
            "{:8} {:>9} {:15.6e} {:15.6e} {:15.6e}",
            node.node,
            node.state.as_str(),
            node.weighted_gap,
            node.normal_multiplier,
            node.tangential_multiplier
        );
    }
    body
}

fn format_job_report(report: &JobReport) -> String {
    format!(
        "*CDYN JOB SUMMARY\n\
         JOB: {}\n\
         ANALYSIS: {}\n\
         STATUS: {}\n\
         NODES: {}\n\
         ELEMENTS: {}\n\
         DOFS: {}\n\
         STEPS: {}\n\
         STARTED: {}\n\
         FINISHED: {}\n\
         MESSAGE: {}\n",
        report.job_name,
        report.analysis_type,
        report.status.as_str(),
        report.num_nodes,
        report.num_elements,
        report.num_dofs,
        report.steps_completed,
        report.started,
        report.finished,
        report.message
    )
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.6e}"))
}

fn append(path: &Path, text: &str) -> Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}
