use std::path::Path;

use crate::cm::*;

/// The formats accepted for uploaded response tables.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum InputFormat {
    Csv,
    Xlsx,
    Xls,
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// The format declared by the user, or else the one given by the file extension.
pub fn input_format(path: &str, declared: Option<&str>) -> CmResult<InputFormat> {
    let format = match declared {
        Some(f) => f.to_string(),
        None => Path::new(path)
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
    };
    match format.to_ascii_lowercase().as_str() {
        "csv" => Ok(InputFormat::Csv),
        "xlsx" => Ok(InputFormat::Xlsx),
        "xls" => Ok(InputFormat::Xls),
        _ => UnsupportedFormatSnafu { format }.fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert_eq!(input_format("a/b.CSV", None).unwrap(), InputFormat::Csv);
        assert_eq!(input_format("b.xlsx", None).unwrap(), InputFormat::Xlsx);
        assert_eq!(input_format("b.data", Some("xls")).unwrap(), InputFormat::Xls);
        assert!(matches!(
            input_format("b.json", None),
            Err(CmError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            input_format("noext", None),
            Err(CmError::UnsupportedFormat { .. })
        ));
        assert_eq!(simplify_file_name("/tmp/x/pilot.csv"), "pilot.csv");
    }
}
