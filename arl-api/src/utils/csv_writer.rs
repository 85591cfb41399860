use candle_core::{Error, Result};
use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

/// Appends rows of named values to a CSV file. The first row fixes the columns; the header is
/// written before it. Later rows must carry the same field names in the same order.
#[derive(Debug)]
pub struct CsvWriter {
    path: PathBuf,
    fieldnames: Option<Vec<String>>,
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

impl CsvWriter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(Error::wrap)?;
        }
        Ok(Self {
            path,
            fieldnames: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, row: &[(&str, String)]) -> Result<()> {
        let names: Vec<String> = row.iter().map(|(name, _)| name.to_string()).collect();
        let mut lines = String::new();
        match &self.fieldnames {
            Some(fieldnames) if *fieldnames != names => {
                return Err(Error::Msg(format!(
                    "csv row fields {names:?} do not match the header {fieldnames:?}"
                )));
            }
            Some(_) => {}
            None => {
                lines.push_str(&names.iter().map(|n| escape(n)).collect::<Vec<_>>().join(","));
                lines.push('\n');
                self.fieldnames = Some(names);
            }
        }
        lines.push_str(
            &row.iter()
                .map(|(_, value)| escape(value))
                .collect::<Vec<_>>()
                .join(","),
        );
        lines.push('\n');
        // reopened in append mode on every row so a crashed run keeps what it logged
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(Error::wrap)?;
        file.write_all(lines.as_bytes()).map_err(Error::wrap)
    }
}

#[cfg(test)]
mod test {
    use super::CsvWriter;
    use candle_core::Result;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("arl-csv-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn header_is_written_once() -> Result<()> {
        let path = temp_path("results.csv");
        let _ = std::fs::remove_file(&path);
        let mut writer = CsvWriter::new(&path)?;
        writer.write(&[("iteration", "1".into()), ("return", "0.50".into())])?;
        writer.write(&[("iteration", "2".into()), ("return", "1.50".into())])?;
        let content = std::fs::read_to_string(&path).map_err(candle_core::Error::wrap)?;
        assert_eq!(content, "iteration,return\n1,0.50\n2,1.50\n");
        Ok(())
    }

    #[test]
    fn rows_with_other_fields_are_rejected() -> Result<()> {
        let path = temp_path("mismatch.csv");
        let _ = std::fs::remove_file(&path);
        let mut writer = CsvWriter::new(&path)?;
        writer.write(&[("a", "1".into())])?;
        assert!(writer.write(&[("b", "1".into())]).is_err());
        Ok(())
    }

    #[test]
    fn fields_with_commas_are_quoted() -> Result<()> {
        let path = temp_path("quoted.csv");
        let _ = std::fs::remove_file(&path);
        let mut writer = CsvWriter::new(&path)?;
        writer.write(&[("env", "a,b".into())])?;
        let content = std::fs::read_to_string(&path).map_err(candle_core::Error::wrap)?;
        assert_eq!(content, "env\n\"a,b\"\n");
        Ok(())
    }
}
