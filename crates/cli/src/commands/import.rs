use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tagvault_core::{import_directory, rehash_all, BatchProgress, Store};

fn active_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {bar:30.cyan/blue} {spinner:.green} {pos:>5}/{len:<5} {prefix:.dim} {msg}",
    )
    .unwrap()
    .progress_chars("━╸─")
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn run(store: &Store, dir: PathBuf) -> Result<()> {
    let cancel = AtomicBool::new(false);
    let mut pb: Option<ProgressBar> = None;

    let imported = import_directory(
        store,
        &dir,
        &cancel,
        Some(&mut |progress| match progress {
            BatchProgress::Start { total } => {
                let bar = ProgressBar::new(total as u64);
                bar.set_style(active_style());
                bar.set_prefix("Importing");
                bar.enable_steady_tick(std::time::Duration::from_millis(80));
                pb = Some(bar);
            }
            BatchProgress::Imported { path } | BatchProgress::Skipped { path } => {
                if let Some(ref bar) = pb {
                    bar.set_message(file_name(&path));
                    bar.inc(1);
                }
            }
            BatchProgress::Cancelled { .. } | BatchProgress::Complete { .. } => {
                if let Some(bar) = pb.take() {
                    bar.finish_and_clear();
                }
            }
            BatchProgress::Rehashed { .. } => {}
        }),
    )?;

    println!("Imported {imported} files from {}", dir.display());
    Ok(())
}

pub fn rehash(store: &Store) -> Result<()> {
    let cancel = AtomicBool::new(false);
    let mut pb: Option<ProgressBar> = None;

    let done = rehash_all(
        store,
        &cancel,
        Some(&mut |progress| match progress {
            BatchProgress::Start { total } => {
                let bar = ProgressBar::new(total as u64);
                bar.set_style(active_style());
                bar.set_prefix("Rehashing");
                bar.enable_steady_tick(std::time::Duration::from_millis(80));
                pb = Some(bar);
            }
            BatchProgress::Rehashed { path } => {
                if let Some(ref bar) = pb {
                    bar.set_message(file_name(&path));
                    bar.inc(1);
                }
            }
            BatchProgress::Cancelled { .. } | BatchProgress::Complete { .. } => {
                if let Some(bar) = pb.take() {
                    bar.finish_and_clear();
                }
            }
            BatchProgress::Imported { .. } | BatchProgress::Skipped { .. } => {}
        }),
    )?;

    println!("Rehashed {done} files");
    Ok(())
}
