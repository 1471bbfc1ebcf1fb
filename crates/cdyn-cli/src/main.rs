use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cdyn_io::{JobReport, JobStatus, ResultWriter};
use cdyn_solver::{ProblemDefinition, StepReport};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!("usage: cdyn-cli run <problem.json> [output-dir]");
    eprintln!("       cdyn-cli check <problem.json>");
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_summary(problem: &ProblemDefinition) {
    println!("job: {}", problem.job_name);
    println!("analysis: {}", problem.analysis_type());
    println!("nodes: {}", problem.num_nodes());
    println!("elements: {}", problem.elements.len());
    println!("dofs: {}", problem.num_dofs());
    if let Some(contact) = &problem.contact {
        println!("slave_nodes: {}", contact.slave_nodes.len());
        println!("master_segments: {}", contact.master_segments.len());
    }
    let time = &problem.config.time;
    println!("dt: {}", time.dt);
    println!("num_steps: {}", time.num_steps);
    println!("max_time: {}", time.max_time);
}

fn print_steps(reports: &[StepReport]) {
    println!(" STEP  ITER  ASET      TIME  STATUS");
    for report in reports {
        println!(
            "{:5} {:5} {:5} {:9.4} {:?}",
            report.step,
            report.newton_iterations,
            report.active_set_steps,
            report.time,
            report.active_set_status
        );
    }
}

fn run(problem: &ProblemDefinition, output_dir: &Path) -> ExitCode {
    let started = timestamp();
    let writer = match ResultWriter::create(output_dir, &problem.job_name) {
        Ok(writer) => writer,
        Err(err) => {
            eprintln!("cannot create output in {}: {err}", output_dir.display());
            return ExitCode::from(1);
        }
    };

    let result = problem
        .build()
        .and_then(|mut solver| solver.integrate(Some(&writer)));
    let (status, steps_completed, message) = match &result {
        Ok(reports) => {
            print_steps(reports);
            (JobStatus::Success, reports.len(), String::new())
        }
        Err(err) => {
            error!(%err, "analysis failed");
            (JobStatus::Failed, 0, err.to_string())
        }
    };

    let report = JobReport {
        job_name: problem.job_name.clone(),
        analysis_type: problem.analysis_type(),
        num_nodes: problem.num_nodes(),
        num_elements: problem.elements.len(),
        num_dofs: problem.num_dofs(),
        steps_completed,
        started,
        finished: timestamp(),
        status,
        message,
    };
    if let Err(err) = writer.finish(&report) {
        eprintln!("cannot write job report: {err}");
        return ExitCode::from(1);
    }
    info!(
        job = %problem.job_name,
        output = %output_dir.display(),
        status = ?status,
        "job finished"
    );

    match status {
        JobStatus::Success => ExitCode::SUCCESS,
        JobStatus::Failed => ExitCode::from(1),
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 || !matches!(args[1].as_str(), "run" | "check") {
        usage();
        return ExitCode::from(2);
    }

    init_logging();
    let problem = match ProblemDefinition::load(&args[2]) {
        Ok(problem) => problem,
        Err(err) => {
            eprintln!("cannot read problem: {err}");
            return ExitCode::from(1);
        }
    };

    match args[1].as_str() {
        "check" => {
            print_summary(&problem);
            match problem.build() {
                Ok(_) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("invalid problem: {err}");
                    ExitCode::from(1)
                }
            }
        }
        _ => {
            let output_dir = args
                .get(3)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            print_summary(&problem);
            run(&problem, &output_dir)
        }
    }
}
