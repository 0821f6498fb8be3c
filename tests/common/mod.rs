//! Shared test infrastructure: builds minimal RO-Crate fixtures on disk
//! and drives the compiled binary against them.

use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

pub struct CrateFixture {
    #[allow(dead_code)]
    temp: TempDir,
    pub crate_dir: PathBuf,
    pub execution_dir: PathBuf,
}

impl CrateFixture {
    /// A staged crate (data persistence on): instrument, one dataset
    /// input, one recorded result, matching recorded sizes, and a default
    /// recorded command.
    pub fn staged() -> Self {
        let temp = TempDir::new().expect("tempdir");
        let crate_dir = temp.path().join("workflow.crate");
        let execution_dir = temp.path().join("run");
        fs::create_dir_all(crate_dir.join("application_sources")).expect("mkdirs");
        fs::create_dir_all(crate_dir.join("dataset")).expect("mkdirs");
        fs::create_dir_all(&execution_dir).expect("mkdirs");

        fs::write(crate_dir.join("application_sources/main.py"), b"1234").expect("write");
        fs::write(crate_dir.join("dataset/input.txt"), b"abc").expect("write");
        fs::write(
            crate_dir.join("ro-crate-info.yaml"),
            "COMPSs Workflow Information:\n  name: fixture workflow\n  data_persistence: true\n",
        )
        .expect("write");

        let metadata = json!({
            "@context": "https://w3id.org/ro/crate/1.1/context",
            "@graph": [
                {
                    "@id": "application_sources/main.py",
                    "@type": ["File", "SoftwareSourceCode"],
                    "name": "main.py",
                    "contentSize": 4
                },
                {
                    "@id": "dataset/input.txt",
                    "@type": "File",
                    "name": "input.txt",
                    "contentSize": 3
                },
                {
                    "@id": "dataset/output/C.0.0",
                    "@type": "File",
                    "name": "C.0.0"
                },
                {
                    "@id": "#run-1",
                    "@type": "CreateAction",
                    "instrument": {"@id": "application_sources/main.py"},
                    "object": [{"@id": "dataset/input.txt"}],
                    "result": [{"@id": "dataset/output/C.0.0"}]
                }
            ]
        });
        fs::write(
            crate_dir.join("ro-crate-metadata.json"),
            serde_json::to_string_pretty(&metadata).expect("serialize metadata"),
        )
        .expect("write");

        let fixture = Self {
            temp,
            crate_dir,
            execution_dir,
        };
        fixture.set_command("runcompss --lang=python /app/main.py /data/input.txt ./output/C.0.0 4");
        fixture
    }

    /// Overwrite the recorded submission command.
    #[allow(dead_code)]
    pub fn set_command(&self, line: &str) {
        fs::write(
            self.crate_dir.join("compss_submission_command_line.txt"),
            format!("{line}\n"),
        )
        .expect("write command file");
    }

    /// Run the compiled binary with the given subcommand and extra args.
    pub fn run(&self, subcommand: &str, extra: &[&str]) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_creplay"));
        command
            .arg(subcommand)
            .arg("--crate-dir")
            .arg(&self.crate_dir);
        if subcommand != "verify" {
            command.arg("--execution-dir").arg(&self.execution_dir);
        }
        command.args(extra);
        command.output().expect("run creplay")
    }
}

/// The reconstructed command is the one stdout line starting with a
/// launcher name; everything above it is the verification table.
#[allow(dead_code)]
pub fn reconstructed_line(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .find(|line| line.starts_with("runcompss") || line.starts_with("enqueue_compss"))
        .unwrap_or_else(|| panic!("no reconstructed command in output:\n{stdout}"))
        .to_string()
}
