use crate::cm::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use survey_scores::{OrgUnit, ScoreRules, TableLayout, Theme, ThemeCatalog};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    pub title: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// One of csv, xlsx, xls. Derived from the file name when missing.
    pub format: Option<String>,
    #[serde(rename = "firstQuestionColumnIndex")]
    _first_question_column_index: Option<JSValue>,
    #[serde(rename = "idColumn")]
    pub id_column: Option<String>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

impl DataSource {
    /// The 0-based index of the first question, given as a number or as an
    /// Excel-style column name.
    pub fn first_question_column_index(&self) -> CmResult<Option<usize>> {
        match &self._first_question_column_index {
            None => Ok(None),
            x => read_js_int(x).map(Some),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CmConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "dataSource")]
    pub data_source: Option<DataSource>,
    pub themes: Option<Vec<Theme>>,
    pub organization: Option<Vec<OrgUnit>>,
    pub admins: Option<Vec<String>>,
    #[serde(rename = "credentialsPath")]
    pub credentials_path: Option<String>,
}

impl CmConfig {
    pub fn score_rules(&self) -> CmResult<ScoreRules> {
        let mut layout = TableLayout::default();
        if let Some(ds) = &self.data_source {
            if let Some(idx) = ds.first_question_column_index()? {
                layout.first_question_column = idx;
            }
            if let Some(id_column) = &ds.id_column {
                layout.id_column = id_column.clone();
            }
        }
        let themes = match &self.themes {
            Some(themes) => ThemeCatalog {
                themes: themes.clone(),
            },
            None => ThemeCatalog::default(),
        };
        let organization = match &self.organization {
            Some(units) => units.clone(),
            None => OrgUnit::default_partition(),
        };
        Ok(ScoreRules {
            layout,
            themes,
            organization,
        })
    }

    pub fn admins(&self) -> Vec<String> {
        match &self.admins {
            Some(admins) => admins.clone(),
            None => DEFAULT_ADMINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn read_config(path: &str) -> CmResult<CmConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: CmConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

/// Resolves a path of the configuration relative to the directory of the configuration file.
pub fn resolve_path(config_path: &str, relative: &str) -> CmResult<String> {
    if Path::new(relative).is_absolute() {
        return Ok(relative.to_string());
    }
    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu {})?;
    let p: PathBuf = root_p.join(relative);
    Ok(p.display().to_string())
}

pub fn read_summary(path: String) -> CmResult<JSValue> {
    let contents = fs::read_to_string(path.clone()).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

fn read_js_int(x: &Option<JSValue>) -> CmResult<usize> {
    match x {
        Some(JSValue::Number(n)) => n
            .as_u64()
            .map(|x| x as usize)
            .context(ParsingJsonNumberSnafu {}),
        // Excel-style columns: A is 0, Z is 25, AA is 26.
        Some(JSValue::String(s)) if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic()) => {
            let col = s
                .to_ascii_uppercase()
                .chars()
                .fold(0usize, |acc, c| acc * 26 + (c as usize - 'A' as usize + 1));
            Ok(col - 1)
        }
        Some(JSValue::String(s)) => s.parse::<usize>().ok().context(ParsingJsonNumberSnafu {}),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_indexes() {
        assert_eq!(read_js_int(&Some(serde_json::json!(6))).unwrap(), 6);
        assert_eq!(read_js_int(&Some(serde_json::json!("7"))).unwrap(), 7);
        assert_eq!(read_js_int(&Some(serde_json::json!("G"))).unwrap(), 6);
        assert_eq!(read_js_int(&Some(serde_json::json!("aa"))).unwrap(), 26);
        assert!(read_js_int(&Some(serde_json::json!("-1"))).is_err());
        assert!(read_js_int(&None).is_err());
    }

    #[test]
    fn config_rules() {
        let js = r#"{
            "outputSettings": {"title": "Pilot", "outputDirectory": "out"},
            "dataSource": {"filePath": "pilot.csv", "firstQuestionColumnIndex": "H", "idColumn": "Id"},
            "organization": [{"department": "D", "team": "T", "size": 4}],
            "admins": ["boss"]
        }"#;
        let config: CmConfig = serde_json::from_str(js).unwrap();
        let rules = config.score_rules().unwrap();
        assert_eq!(rules.layout.first_question_column, 7);
        assert_eq!(rules.layout.id_column, "Id");
        assert_eq!(rules.organization, vec![OrgUnit::new("D", "T", 4)]);
        assert_eq!(rules.themes, ThemeCatalog::default());
        assert_eq!(config.admins(), vec!["boss".to_string()]);
    }

    #[test]
    fn default_rules_and_admins() {
        let config: CmConfig =
            serde_json::from_str(r#"{"outputSettings": {"title": "x"}}"#).unwrap();
        let rules = config.score_rules().unwrap();
        assert_eq!(rules, ScoreRules::with_default_organization());
        assert_eq!(config.admins().len(), 2);
    }

    #[test]
    fn paths_relative_to_config() {
        assert_eq!(
            resolve_path("/data/cfg/config.json", "pilot.csv").unwrap(),
            "/data/cfg/pilot.csv"
        );
        assert_eq!(
            resolve_path("/data/cfg/config.json", "/tmp/pilot.csv").unwrap(),
            "/tmp/pilot.csv"
        );
    }
}
