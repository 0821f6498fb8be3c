//! Replay orchestration: wires catalog, indexes, resolvers, assembler,
//! verifier, and executor into the staged and DPF pipelines.

use crate::assemble::{self, OrderedToken};
use crate::catalog::EntityCatalog;
use crate::cluster;
use crate::config::CrateInfo;
use crate::exec;
use crate::index::NameIndex;
use crate::remote;
use crate::report::{self, ThirdColumn};
use crate::resolve::dpf::DpfMapper;
use crate::resolve::results::{ResultAllocator, RESULT_DIR};
use crate::resolve::{self, Category, CategoryResolver, ResolvedPath};
use crate::stage;
use crate::tokens::{self, TokenKind, PROVENANCE_FLAG};
use crate::verify::{self, ObjectLocation, VerificationReport, VerifyOptions};
use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// The recorded submission command lives as the first line of this file in
/// the crate root.
pub const COMMAND_FILE: &str = "compss_submission_command_line.txt";

#[derive(Debug, Default)]
pub struct ReplayOptions {
    /// Substitute dataset root: resolution uses it instead of the crate's
    /// `dataset/`, and integrity verification is skipped because the
    /// recorded sizes no longer apply.
    pub new_dataset: Option<PathBuf>,
    /// Re-add the reproduction-control flag to the reconstructed command.
    pub provenance: bool,
    pub check_dates: bool,
}

/// Reproduce the recorded run. With `execute` off, the reconstructed
/// command is printed instead of run. Returns whether execution (or
/// reconstruction, in dry-run mode) succeeded.
pub fn replay(
    crate_dir: &Path,
    execution_dir: &Path,
    options: &ReplayOptions,
    execute: bool,
) -> Result<bool> {
    let info = CrateInfo::load(crate_dir)?;
    if let Some(name) = &info.workflow.name {
        tracing::info!(workflow = %name, "loaded crate information");
    }
    let catalog = EntityCatalog::load(crate_dir, info.data_persistent())?;
    if let Some(version) = cluster::runtime_version() {
        tracing::info!(%version, "found installed runtime");
    }

    if catalog.data_persistent {
        replay_staged(crate_dir, execution_dir, &catalog, options, execute)
    } else {
        replay_dpf(crate_dir, execution_dir, &catalog, options, execute)
    }
}

/// Verification only, no reconstruction. Strict in both modes: any missing
/// or size-mismatched file is an error.
pub fn verify_only(crate_dir: &Path, check_dates: bool) -> Result<()> {
    let info = CrateInfo::load(crate_dir)?;
    let catalog = EntityCatalog::load(crate_dir, info.data_persistent())?;
    let options = VerifyOptions { check_dates };

    if catalog.data_persistent {
        let report = verify::verify(&catalog, crate_dir, ObjectLocation::Staged, options);
        print_report(&report, ThirdColumn::Existence);
        warn_on_date_drift(&report, check_dates);
        report.check()?;
    } else {
        check_accessibility_gate(&catalog)?;
        let report = verify::verify(&catalog, crate_dir, ObjectLocation::InPlace, options);
        print_report(&report, dpf_third_column(check_dates));
        warn_on_date_drift(&report, check_dates);
        report.check()?;
    }
    tracing::info!("all catalogued files verified");
    Ok(())
}

fn replay_staged(
    crate_dir: &Path,
    execution_dir: &Path,
    catalog: &EntityCatalog,
    options: &ReplayOptions,
    execute: bool,
) -> Result<bool> {
    let remote_active = catalog.has_remote_objects();
    if remote_active {
        if execute {
            remote::fetch_remote_objects(catalog, crate_dir)?;
        } else {
            tracing::debug!("dry run: assuming the remote dataset is already downloaded");
        }
    }

    if options.new_dataset.is_none() {
        let report = verify::verify(
            catalog,
            crate_dir,
            ObjectLocation::Staged,
            VerifyOptions {
                check_dates: options.check_dates,
            },
        );
        print_report(&report, ThirdColumn::Existence);
        warn_on_date_drift(&report, options.check_dates);
        report.check()?;
    } else {
        tracing::info!("replaying on a substituted dataset; skipping integrity verification");
    }

    let command = reconstruct_staged(crate_dir, execution_dir, catalog, options)?;
    if !execute {
        println!("{}", shell_words::join(&command));
        return Ok(true);
    }

    let workdir = env::current_dir().context("resolve working directory")?;
    let initial = stage::snapshot_names(&workdir)?;
    let mut staged_names = stage::stage_inputs(crate_dir, &workdir)?;
    if remote_active {
        staged_names.extend(stage::stage_remote_inputs(crate_dir, &workdir)?);
    }

    let outcome = exec::execute(&command, execution_dir);
    stage::cleanup(&workdir, &staged_names);
    let ok = outcome?;
    stage::move_new_entries(&workdir, &initial, execution_dir)?;
    Ok(ok)
}

fn replay_dpf(
    crate_dir: &Path,
    execution_dir: &Path,
    catalog: &EntityCatalog,
    options: &ReplayOptions,
    execute: bool,
) -> Result<bool> {
    check_accessibility_gate(catalog)?;
    let report = verify::verify(
        catalog,
        crate_dir,
        ObjectLocation::InPlace,
        VerifyOptions {
            check_dates: options.check_dates,
        },
    );
    print_report(&report, dpf_third_column(options.check_dates));
    warn_on_date_drift(&report, options.check_dates);
    // With data in place the metadata check only warns: the recorded
    // inputs are whatever the shared filesystem holds now.
    if let Err(error) = report.check() {
        tracing::warn!(%error, "metadata mismatch; re-execution may not reproduce the recorded results");
    }

    let command = reconstruct_dpf(crate_dir, execution_dir, catalog, options)?;
    if !execute {
        println!("{}", shell_words::join(&command));
        return Ok(true);
    }
    exec::execute(&command, execution_dir)
}

/// Reconstruct the command against the staged crate layout.
pub fn reconstruct_staged(
    crate_dir: &Path,
    execution_dir: &Path,
    catalog: &EntityCatalog,
    options: &ReplayOptions,
) -> Result<Vec<String>> {
    let command_line = read_recorded_command(crate_dir)?;
    let app_index = NameIndex::build(&crate_dir.join(Category::ApplicationSources.dir_name()))?;
    let (data_category, data_root) = match &options.new_dataset {
        Some(root) => (Category::NewDataset, root.clone()),
        None => (
            Category::Dataset,
            crate_dir.join(Category::Dataset.dir_name()),
        ),
    };
    let data_index = NameIndex::build(&data_root)?;
    let remote_index = if catalog.has_remote_objects() {
        Some(NameIndex::build(
            &crate_dir.join(Category::RemoteDataset.dir_name()),
        )?)
    } else {
        None
    };

    let mut categories = vec![
        CategoryResolver {
            category: Category::ApplicationSources,
            index: &app_index,
        },
        CategoryResolver {
            category: data_category,
            index: &data_index,
        },
    ];
    if let Some(index) = &remote_index {
        categories.push(CategoryResolver {
            category: Category::RemoteDataset,
            index,
        });
    }

    let allocator = ResultAllocator::new(execution_dir, &catalog.results);
    let mut resolved: Vec<ResolvedPath> = Vec::new();
    let mut passthrough: Vec<OrderedToken> = Vec::new();

    for token in tokens::classify_command(&command_line)? {
        match token.kind {
            TokenKind::Flag => passthrough.push(OrderedToken {
                value: token.value,
                index: token.index,
            }),
            TokenKind::PathLike => {
                let rendered = match allocator.match_path(&token.value)? {
                    Some(path) => resolve::resolved_string(&token.value, &path),
                    None => {
                        let path = resolve::resolve_local(&token.value, &categories)?;
                        resolve::resolved_string(&token.value, &path)
                    }
                };
                resolved.push(ResolvedPath {
                    original: token.value,
                    resolved: rendered,
                    index: token.index,
                });
            }
            TokenKind::Value => {
                if let Some(path) = allocator.match_value(&token.value)? {
                    resolved.push(ResolvedPath {
                        original: token.value,
                        resolved: path.display().to_string(),
                        index: token.index,
                    });
                } else if let Some(path) = lookup_value(&token.value, &categories) {
                    resolved.push(ResolvedPath {
                        original: token.value,
                        resolved: path,
                        index: token.index,
                    });
                } else {
                    passthrough.push(OrderedToken {
                        value: token.value,
                        index: token.index,
                    });
                }
            }
        }
    }

    let mut command = assemble::merge(resolved, passthrough);
    finish_command(&mut command, options);
    Ok(command)
}

/// Reconstruct the command against the recorded absolute paths (DPF).
pub fn reconstruct_dpf(
    crate_dir: &Path,
    execution_dir: &Path,
    catalog: &EntityCatalog,
    options: &ReplayOptions,
) -> Result<Vec<String>> {
    let command_line = read_recorded_command(crate_dir)?;
    let app_index = NameIndex::build(&crate_dir.join(Category::ApplicationSources.dir_name()))?;
    let mut mapper = DpfMapper::new(catalog, &app_index, execution_dir.join(RESULT_DIR));

    let mut resolved: Vec<ResolvedPath> = Vec::new();
    let mut passthrough: Vec<OrderedToken> = Vec::new();

    for token in tokens::classify_command(&command_line)? {
        match token.kind {
            TokenKind::Flag => passthrough.push(OrderedToken {
                value: token.value,
                index: token.index,
            }),
            TokenKind::PathLike => {
                let rendered = mapper.resolve(&token.value)?;
                resolved.push(ResolvedPath {
                    original: token.value,
                    resolved: rendered,
                    index: token.index,
                });
            }
            TokenKind::Value => {
                if let Some(path) = app_index.get(&token.value) {
                    resolved.push(ResolvedPath {
                        original: token.value,
                        resolved: path.display().to_string(),
                        index: token.index,
                    });
                } else if let Some(entry) = catalog
                    .objects
                    .iter()
                    .find(|entry| entry.name == token.value && !entry.is_remote())
                {
                    resolved.push(ResolvedPath {
                        original: token.value,
                        resolved: entry.host_path(),
                        index: token.index,
                    });
                } else {
                    passthrough.push(OrderedToken {
                        value: token.value,
                        index: token.index,
                    });
                }
            }
        }
    }

    let mut command = assemble::merge(resolved, passthrough);
    finish_command(&mut command, options);
    Ok(command)
}

pub fn read_recorded_command(crate_dir: &Path) -> Result<String> {
    let path = crate_dir.join(COMMAND_FILE);
    let content = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let line = content.lines().next().unwrap_or("").trim().to_string();
    if line.is_empty() {
        bail!("{} holds no recorded command", path.display());
    }
    Ok(line)
}

fn lookup_value(value: &str, categories: &[CategoryResolver<'_>]) -> Option<String> {
    categories
        .iter()
        .find_map(|resolver| resolver.index.get(value))
        .map(|path| path.display().to_string())
}

fn finish_command(command: &mut Vec<String>, options: &ReplayOptions) {
    assemble::substitute_launcher(command, cluster::on_slurm_cluster());
    if options.provenance && !command.is_empty() {
        command.insert(1, PROVENANCE_FLAG.to_string());
    }
}

fn check_accessibility_gate(catalog: &EntityCatalog) -> Result<()> {
    let inaccessible = verify::check_accessibility(catalog);
    if inaccessible.is_empty() {
        return Ok(());
    }
    for path in &inaccessible {
        tracing::error!(path = %path.display(), "recorded input is not accessible from this host");
    }
    bail!(
        "{} recorded input path(s) are not accessible from this host",
        inaccessible.len()
    );
}

fn print_report(report: &VerificationReport, third: ThirdColumn) {
    println!("{}", report::render_status_table(&report.records, third));
    println!("{}", report::symbol_legend());
}

fn dpf_third_column(check_dates: bool) -> ThirdColumn {
    if check_dates {
        ThirdColumn::ModifiedDate
    } else {
        ThirdColumn::Existence
    }
}

fn warn_on_date_drift(report: &VerificationReport, check_dates: bool) {
    if check_dates && !report.dates_ok() {
        tracing::warn!(
            mismatches = report.date_mismatches.len(),
            "modification dates differ from the recorded ones; results may not reproduce exactly"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InstrumentEntry, ObjectEntry, ResultEntry};

    fn write(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).expect("mkdirs");
        fs::write(path, bytes).expect("write");
    }

    fn staged_catalog() -> EntityCatalog {
        EntityCatalog {
            instrument: InstrumentEntry {
                identifier: "application_sources/main.py".into(),
                content_size: Some(4),
            },
            objects: vec![ObjectEntry {
                name: "input.txt".into(),
                identifier: "dataset/input.txt".into(),
                content_size: Some(3),
                date_modified: None,
            }],
            results: vec![ResultEntry {
                name: "C.0.0".into(),
                identifier: "dataset/output/C.0.0".into(),
            }],
            data_persistent: true,
        }
    }

    #[test]
    fn reconstructs_in_original_order_with_resolved_paths() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let crate_dir = tmp.path().join("crate");
        let execution_dir = tmp.path().join("run");
        write(&crate_dir, "application_sources/main.py", b"1234");
        write(&crate_dir, "dataset/input.txt", b"abc");
        fs::create_dir_all(&execution_dir).expect("mkdirs");
        fs::write(
            crate_dir.join(COMMAND_FILE),
            "runcompss --lang=python /app/main.py /data/input.txt ./output/C.0.0 4\n",
        )
        .expect("write command");

        let catalog = staged_catalog();
        let command = reconstruct_staged(
            &crate_dir,
            &execution_dir,
            &catalog,
            &ReplayOptions::default(),
        )
        .expect("reconstruct");

        assert_eq!(command.len(), 6);
        assert_eq!(command[0], "runcompss");
        assert_eq!(command[1], "--lang=python");
        assert_eq!(
            command[2],
            crate_dir.join("application_sources/main.py").display().to_string()
        );
        assert_eq!(
            command[3],
            crate_dir.join("dataset/input.txt").display().to_string()
        );
        assert_eq!(
            command[4],
            execution_dir.join("Result/C.0.0").display().to_string()
        );
        assert_eq!(command[5], "4");
    }

    #[test]
    fn provenance_flag_is_reinserted_after_the_launcher() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let crate_dir = tmp.path().join("crate");
        let execution_dir = tmp.path().join("run");
        write(&crate_dir, "application_sources/main.py", b"1234");
        fs::create_dir_all(crate_dir.join("dataset")).expect("mkdirs");
        fs::create_dir_all(&execution_dir).expect("mkdirs");
        fs::write(
            crate_dir.join(COMMAND_FILE),
            "runcompss --provenance /app/main.py\n",
        )
        .expect("write command");

        let mut catalog = staged_catalog();
        catalog.objects.clear();
        let options = ReplayOptions {
            provenance: true,
            ..Default::default()
        };
        let command = reconstruct_staged(&crate_dir, &execution_dir, &catalog, &options)
            .expect("reconstruct");
        assert_eq!(command[1], PROVENANCE_FLAG);
    }

    #[test]
    fn unresolvable_tokens_abort_reconstruction() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let crate_dir = tmp.path().join("crate");
        let execution_dir = tmp.path().join("run");
        write(&crate_dir, "application_sources/main.py", b"1234");
        fs::create_dir_all(crate_dir.join("dataset")).expect("mkdirs");
        fs::create_dir_all(&execution_dir).expect("mkdirs");
        fs::write(crate_dir.join(COMMAND_FILE), "runcompss /data/nope.txt\n")
            .expect("write command");

        let catalog = staged_catalog();
        let err = reconstruct_staged(
            &crate_dir,
            &execution_dir,
            &catalog,
            &ReplayOptions::default(),
        )
        .unwrap_err();
        assert!(err
            .downcast_ref::<resolve::ResolutionError>()
            .is_some());
    }

    #[test]
    fn substituted_datasets_take_the_dataset_slot() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let crate_dir = tmp.path().join("crate");
        let execution_dir = tmp.path().join("run");
        let fresh = tmp.path().join("fresh");
        write(&crate_dir, "application_sources/main.py", b"1234");
        write(&crate_dir, "dataset/input.txt", b"old");
        write(&fresh, "input.txt", b"new data");
        fs::create_dir_all(&execution_dir).expect("mkdirs");
        fs::write(crate_dir.join(COMMAND_FILE), "runcompss /data/input.txt\n")
            .expect("write command");

        let catalog = staged_catalog();
        let options = ReplayOptions {
            new_dataset: Some(fresh.clone()),
            ..Default::default()
        };
        let command = reconstruct_staged(&crate_dir, &execution_dir, &catalog, &options)
            .expect("reconstruct");
        assert_eq!(command[1], fresh.join("input.txt").display().to_string());
    }

    #[test]
    fn dpf_reconstruction_maps_against_recorded_absolute_paths() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let crate_dir = tmp.path().join("crate");
        let execution_dir = tmp.path().join("run");
        write(&crate_dir, "application_sources/main.py", b"1234");
        fs::create_dir_all(&execution_dir).expect("mkdirs");
        let data = tmp.path().join("gpfs/data");
        fs::create_dir_all(&data).expect("mkdirs");
        fs::write(data.join("input.txt"), b"abc").expect("write");
        fs::write(
            crate_dir.join(COMMAND_FILE),
            format!("runcompss /app/main.py {}/gpfs/data/input.txt\n", tmp.path().display()),
        )
        .expect("write command");

        let catalog = EntityCatalog {
            instrument: InstrumentEntry {
                identifier: "application_sources/main.py".into(),
                content_size: Some(4),
            },
            objects: vec![ObjectEntry {
                name: "input.txt".into(),
                identifier: format!(
                    "file://cluster{}/gpfs/data/input.txt",
                    tmp.path().display()
                ),
                content_size: Some(3),
                date_modified: None,
            }],
            results: Vec::new(),
            data_persistent: false,
        };
        let command = reconstruct_dpf(
            &crate_dir,
            &execution_dir,
            &catalog,
            &ReplayOptions::default(),
        )
        .expect("reconstruct");
        assert_eq!(command[1], crate_dir.join("application_sources/main.py").display().to_string());
        assert_eq!(command[2], data.join("input.txt").display().to_string());
    }

    #[test]
    fn recorded_command_must_not_be_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join(COMMAND_FILE), "\n").expect("write");
        assert!(read_recorded_command(tmp.path()).is_err());
    }
}
