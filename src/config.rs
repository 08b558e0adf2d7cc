use std::path::PathBuf;

/// Pipeline configuration, built once in `main` from CLI flags and
/// passed explicitly to each component.
#[derive(Clone, Debug)]
pub struct Config {
    /// Raw source documents (text extracted from exam PDFs).
    pub input_dir: PathBuf,
    /// Normalized Markdown, reports and run summaries.
    pub output_dir: PathBuf,
    /// Generated INSERT artifacts.
    pub sql_dir: PathBuf,
    /// Question/trend store.
    pub db_path: PathBuf,
    /// Overwrite already-converted documents.
    pub force: bool,
    /// Full parse/score/emit pass without store writes.
    pub dry_run: bool,
    /// Restrict processing to one exam year.
    pub year: Option<i32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/raw"),
            output_dir: PathBuf::from("data/converted_md"),
            sql_dir: PathBuf::from("data/sql"),
            db_path: PathBuf::from("data/cpl.sqlite"),
            force: false,
            dry_run: false,
            year: None,
        }
    }
}

impl Config {
    pub fn reports_dir(&self) -> PathBuf {
        self.output_dir.join("reports")
    }
}
