use std::fs;
use std::io;
use std::path::Path;

use crate::app::models::NotebookStatus;

/// Notebooks the collision-severity project is expected to produce.
pub const DEFAULT_NOTEBOOKS: &[&str] = &[
    "01_data_ingestion_profiling.ipynb",
    "02_deep_cleaning_transformation.ipynb",
    "03_eda_visualization.ipynb",
    "04_feature_engineering.ipynb",
    "05_ml_pipeline_training.ipynb",
    "06_explainability_insights.ipynb",
];

/// Sizes each expected notebook under `dir`. Missing files report zero bytes.
pub fn check_notebooks<S: AsRef<str>>(
    dir: &Path,
    names: &[S],
    min_size: u64,
) -> io::Result<Vec<NotebookStatus>> {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            let size_bytes = match fs::metadata(dir.join(name)) {
                Ok(meta) if meta.is_file() => meta.len(),
                Ok(_) => 0,
                Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
                Err(e) => return Err(e),
            };
            Ok(NotebookStatus {
                name: name.to_string(),
                size_bytes,
                ready: size_bytes > min_size,
            })
        })
        .collect()
}

/// File names of the `.png` images directly inside `dir`, sorted.
pub fn list_visualizations(dir: &Path) -> io::Result<Vec<String>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_png = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "png");
        if is_png {
            found.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    found.sort();
    Ok(found)
}
