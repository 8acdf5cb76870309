// THEORY:
// The dataset ledger is a table that a separate review tool reads: one row per
// source image, pointing at both the raw photo and its composite, plus a
// review `status` (0 = unreviewed or invalid, 1 = valid). The engine never
// reads the ledger back. It only seeds it. It walks the same corpus with the
// same enumeration rules and the same `corpus::output_path_for`, so
// `filtered_image_path` always names the file the orchestrator writes.

use crate::core_modules::corpus;
use crate::error::{LeafError, Result};
use std::fs;
use std::path::Path;

pub const HEADER: &str = "image_path,filtered_image_path,class,file_name,status";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub image_path: String,
    pub filtered_image_path: String,
    pub class: String,
    pub file_name: String,
    pub status: u8,
}

impl LedgerRow {
    fn to_csv(&self) -> String {
        [
            csv_field(&self.image_path),
            csv_field(&self.filtered_image_path),
            csv_field(&self.class),
            csv_field(&self.file_name),
            self.status.to_string(),
        ]
        .join(",")
    }
}

/// One unreviewed row per supported image under `input_root`, in corpus order.
/// Enumeration matches the orchestrator's, including unlistable class folders
/// contributing no rows.
pub fn build_ledger(input_root: &Path, output_root: &Path) -> Result<Vec<LedgerRow>> {
    let mut rows = Vec::new();
    for class in corpus::list_corpus(input_root)? {
        for image in class.images {
            let filtered = corpus::output_path_for(output_root, &class.label, &image);
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            rows.push(LedgerRow {
                image_path: with_forward_slashes(&image),
                filtered_image_path: with_forward_slashes(&filtered),
                class: class.label.clone(),
                file_name,
                status: 0,
            });
        }
    }
    Ok(rows)
}

/// Writes `rows` as CSV, replacing any existing ledger at `path`.
pub fn write_ledger_csv(rows: &[LedgerRow], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LeafError::io(parent, e))?;
    }

    let mut text = String::from(HEADER);
    text.push('\n');
    for row in rows {
        text.push_str(&row.to_csv());
        text.push('\n');
    }
    fs::write(path, text).map_err(|e| LeafError::io(path, e))
}

fn with_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_with_separators_are_quoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn ledger_rows_use_the_orchestrator_path_rule() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("leaves");
        fs::create_dir_all(input.join("Scab")).unwrap();
        fs::write(input.join("Scab/leaf 1.JPG"), b"").unwrap();
        fs::write(input.join("Scab/readme.md"), b"").unwrap();
        let output = dir.path().join("processed_images");

        let rows = build_ledger(&input, &output).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.class, "Scab");
        assert_eq!(row.file_name, "leaf 1.JPG");
        assert_eq!(row.status, 0);
        assert_eq!(
            row.filtered_image_path,
            with_forward_slashes(&output.join("Scab").join("leaf 1_processed.png"))
        );
    }

    #[test]
    fn ledger_rows_follow_the_orchestrator_plan() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("leaves");
        for (class, file) in [("Scab", "b.png"), ("Scab", "a.jpg"), ("Healthy", "h.bmp")] {
            fs::create_dir_all(input.join(class)).unwrap();
            fs::write(input.join(class).join(file), b"").unwrap();
        }
        fs::create_dir_all(input.join("Empty")).unwrap();
        let config = crate::config::BatchConfig::new(input.clone(), dir.path().join("out"));

        let rows = build_ledger(&config.input_root, &config.output_root).unwrap();
        let planned: Vec<String> = crate::pipeline::plan_corpus(&config)
            .unwrap()
            .iter()
            .flat_map(|plan| plan.jobs.iter())
            .map(|job| with_forward_slashes(&job.output_path))
            .collect();

        let ledgered: Vec<String> = rows.iter().map(|r| r.filtered_image_path.clone()).collect();
        assert_eq!(ledgered, planned);
        assert_eq!(ledgered.len(), 3);
    }

    #[test]
    fn written_ledger_has_header_and_one_line_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source/leaves.csv");
        let rows = vec![LedgerRow {
            image_path: "leaves/A/x.jpg".into(),
            filtered_image_path: "processed_images/A/x_processed.png".into(),
            class: "A".into(),
            file_name: "x.jpg".into(),
            status: 0,
        }];

        write_ledger_csv(&rows, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "leaves/A/x.jpg,processed_images/A/x_processed.png,A,x.jpg,0");
        assert_eq!(lines.len(), 2);
    }
}
