// ********* Input data structures ***********

use std::cmp::Ordering;
use std::error::Error;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The sentinel label that disables respondent filtering.
pub const ALL_RESPONDENTS: &str = "All";

/// Question labels are wrapped at this many characters.
pub const WRAP_WIDTH: usize = 30;

/// The line-break token understood by the chart renderer.
pub const LINE_BREAK: &str = "<br>";

/// Scores and averages are always coloured over this fixed range.
pub const SCORE_RANGE: (f64, f64) = (-3.0, 3.0);

pub const CHART_HEIGHT: u32 = 400;

/// The diverging palette, from "strongly disagree" to "strongly agree".
/// Mapped one-to-one onto [`Score::ALL`].
pub const PALETTE: [&str; 6] = [
    "#D73027", // dark red
    "#FC8D59", // red
    "#FEE08B", // yellow
    "#D9EF8B", // light green
    "#91CF60", // green
    "#1A9850", // dark green
];

pub(crate) const PALETTE_RGB: [(u8, u8, u8); 6] = [
    (0xD7, 0x30, 0x27),
    (0xFC, 0x8D, 0x59),
    (0xFE, 0xE0, 0x8B),
    (0xD9, 0xEF, 0x8B),
    (0x91, 0xCF, 0x60),
    (0x1A, 0x98, 0x50),
];

/// The content of one cell of an uploaded response table.
///
/// A column is considered numeric (i.e. a scored question) as long as none
/// of its cells holds text.
#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    /// Interprets a raw textual cell, as found in CSV files.
    ///
    /// Blank content is empty, anything that parses as a float is a number,
    /// everything else is text.
    pub fn parse(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(x) if x.is_nan() => Cell::Empty,
            Ok(x) => Cell::Number(x),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(x) if !x.is_nan() => Some(*x),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Cell::Text(_))
    }

    /// The textual rendering of a cell, used for identifiers.
    /// Integral numbers are printed without a fractional part.
    pub fn display_value(&self) -> Option<String> {
        match self {
            Cell::Number(x) if x.is_finite() && x.fract() == 0.0 => Some(format!("{}", *x as i64)),
            Cell::Number(x) if x.is_nan() => None,
            Cell::Number(x) => Some(x.to_string()),
            Cell::Text(s) => Some(s.clone()),
            Cell::Empty => None,
        }
    }
}

/// The identifier of a respondent, as found in the ID column.
///
/// Identifiers are ordered naturally: numeric identifiers compare as numbers
/// and come before textual ones, which compare lexically.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RespondentId(pub String);

impl RespondentId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for RespondentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Ord for RespondentId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<f64>(), other.0.parse::<f64>()) {
            (Ok(a), Ok(b)) => a.total_cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for RespondentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A rectangular table of survey responses: one row per respondent.
///
/// Invariant: every row has exactly as many cells as there are columns.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ResponseTable {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<Cell>>,
}

impl ResponseTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// The position of the first column with this name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().filter_map(move |row| row.get(idx))
    }

    /// The non-missing numeric values of a column, in row order.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = f64> + '_ {
        self.column(idx).filter_map(|c| c.as_number())
    }

    pub fn is_numeric_column(&self, idx: usize) -> bool {
        !self.column(idx).any(|c| c.is_text())
    }
}

/// A score on the canonical symmetric scale. Zero is not a valid score.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Score(i8);

impl Score {
    /// All the valid scores, in chart order.
    pub const ALL: [Score; 6] = [
        Score(-3),
        Score(-2),
        Score(-1),
        Score(1),
        Score(2),
        Score(3),
    ];

    pub fn new(value: i8) -> Option<Score> {
        Score::ALL.iter().find(|s| s.0 == value).copied()
    }

    /// Only exact integral values on the scale are accepted.
    pub fn from_value(value: f64) -> Option<Score> {
        if value.fract() != 0.0 || !value.is_finite() || value.abs() > 3.0 {
            return None;
        }
        Score::new(value as i8)
    }

    pub fn value(&self) -> i8 {
        self.0
    }

    /// The position of this score in [`Score::ALL`] and in the palette.
    pub fn position(&self) -> usize {
        Score::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    pub fn color(&self) -> &'static str {
        PALETTE[self.position()]
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ********* Configuration **********

/// Where the interesting columns are located in an uploaded table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TableLayout {
    /// All the columns from this (0-based) index onward are questions.
    pub first_question_column: usize,
    pub id_column: String,
}

impl Default for TableLayout {
    fn default() -> Self {
        TableLayout {
            first_question_column: 6,
            id_column: "ID".to_string(),
        }
    }
}

/// A named theme and its canonical, ordered list of question texts.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub questions: Vec<String>,
}

impl Theme {
    pub fn new(name: &str, questions: &[&str]) -> Theme {
        Theme {
            name: name.to_string(),
            questions: questions.iter().map(|q| q.to_string()).collect(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeCatalog {
    pub themes: Vec<Theme>,
}

impl Default for ThemeCatalog {
    /// The six themes of the Culture & Moi questionnaire.
    fn default() -> Self {
        ThemeCatalog {
            themes: vec![
                Theme::new(
                    "Interdependency and objectives",
                    &["I am aware that we depend on each other within my team to be able to deliver"],
                ),
                Theme::new(
                    "Agreed rules in the way of working",
                    &["I feel the rules we use for our way of working within the team are defined and agreed upon by the whole team"],
                ),
                Theme::new(
                    "Sense of belonging",
                    &[
                        "I do feel I belong to the team",
                        "I feel that everyone, myself included, contributes to the care of the ambiance of the team.",
                    ],
                ),
                Theme::new(
                    "Bond the group",
                    &[
                        "With the other members of the team we share collective time which allows us to be united.",
                        "I feel I am at ease with the other team members",
                    ],
                ),
                Theme::new(
                    "Conflict resolution",
                    &["I have the feeling disagreements/misunderstandings, conflicts are resolved through peaceful dialogue and contribute to the development of empathy within the team"],
                ),
                Theme::new(
                    "Safe environment",
                    &[
                        "I do feel I am supported",
                        "I feel I am in a safe environment",
                        "I feel that I am not judged or evaluated",
                    ],
                ),
            ],
        }
    }
}

/// A slice of consecutive respondents assigned to a team of a department.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OrgUnit {
    pub department: String,
    pub team: String,
    pub size: usize,
}

impl OrgUnit {
    pub fn new(department: &str, team: &str, size: usize) -> OrgUnit {
        OrgUnit {
            department: department.to_string(),
            team: team.to_string(),
            size,
        }
    }

    /// The partition used for the 13 respondents of the pilot survey.
    pub fn default_partition() -> Vec<OrgUnit> {
        vec![
            OrgUnit::new("Department of Mental health", "Team Culture & Moi", 5),
            OrgUnit::new("Department of Informatics", "Team Agilopathes", 3),
            OrgUnit::new("Department of Informatics", "Team Collaboration", 5),
        ]
    }
}

/// Everything that controls how a table is interpreted.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ScoreRules {
    pub layout: TableLayout,
    pub themes: ThemeCatalog,
    pub organization: Vec<OrgUnit>,
}

impl ScoreRules {
    pub fn with_default_organization() -> ScoreRules {
        ScoreRules {
            organization: OrgUnit::default_partition(),
            ..Default::default()
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RespondentOrder {
    /// Increasing median score.
    MedianScore,
    /// Natural order of the identifiers.
    Identifier,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum RespondentSelection {
    All,
    Only(Vec<RespondentId>),
}

impl RespondentSelection {
    /// Builds a selection from user-provided labels. The presence of
    /// [`ALL_RESPONDENTS`] anywhere in the list disables filtering.
    pub fn from_labels(labels: &[String]) -> RespondentSelection {
        if labels.iter().any(|l| l == ALL_RESPONDENTS) {
            RespondentSelection::All
        } else {
            RespondentSelection::Only(labels.iter().map(|l| RespondentId(l.clone())).collect())
        }
    }

    pub fn contains(&self, id: &RespondentId) -> bool {
        match self {
            RespondentSelection::All => true,
            RespondentSelection::Only(ids) => ids.contains(id),
        }
    }
}

// ******** Output data structures *********

/// The questions of a theme that are present in a given table.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct QuestionGroup {
    pub theme: String,
    pub questions: Vec<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct ScoreSeries {
    pub score: Score,
    pub color: String,
    /// One count per category of the chart.
    pub counts: Vec<u64>,
}

/// A categorical bar chart stacking the number of answers at each score.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackedBarChart {
    pub x_title: String,
    /// The unwrapped keys (question texts or respondent identifiers).
    pub keys: Vec<String>,
    /// The labels to display on the x axis, in display order.
    pub categories: Vec<String>,
    /// One series per score, in score order.
    pub series: Vec<ScoreSeries>,
    pub height: u32,
}

impl StackedBarChart {
    pub fn count(&self, key: &str, score: Score) -> Option<u64> {
        let idx = self.keys.iter().position(|k| k == key)?;
        self.series
            .iter()
            .find(|s| s.score == score)
            .and_then(|s| s.counts.get(idx).copied())
    }

    pub fn total(&self, key: &str) -> Option<u64> {
        let idx = self.keys.iter().position(|k| k == key)?;
        Some(self.series.iter().filter_map(|s| s.counts.get(idx)).sum())
    }
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageBar {
    pub question: String,
    pub label: String,
    pub average: f64,
    pub color: String,
}

/// Bars coloured on a continuous scale, used for the top/bottom questions.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageBarChart {
    pub bars: Vec<AverageBar>,
    pub y_range: (f64, f64),
    pub color_range: (f64, f64),
    pub palette: Vec<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreemapNode {
    pub id: String,
    pub parent: Option<String>,
    pub label: String,
    /// The number of respondents below this node.
    pub respondents: usize,
    pub average: f64,
    pub color: String,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Treemap {
    pub nodes: Vec<TreemapNode>,
    pub color_range: (f64, f64),
    pub palette: Vec<String>,
}

impl Treemap {
    pub fn node(&self, id: &str) -> Option<&TreemapNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn children(&self, id: &str) -> Vec<&TreemapNode> {
        self.nodes
            .iter()
            .filter(|n| n.parent.as_deref() == Some(id))
            .collect()
    }
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct ThemeChart {
    pub theme: String,
    pub chart: StackedBarChart,
}

/// The complete content of the dashboard.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub questions: Vec<String>,
    pub numeric_questions: Vec<String>,
    pub respondents: Vec<RespondentId>,
    pub groups: Vec<QuestionGroup>,
    pub treemap: Treemap,
    pub bottom_questions: AverageBarChart,
    pub top_questions: AverageBarChart,
    pub question_charts: Vec<ThemeChart>,
    pub respondent_chart: StackedBarChart,
}

/// Errors that prevent the aggregation from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ScoreErrors {
    MissingColumn(String),
    UnknownTheme(String),
    /// A row does not have the width of the header.
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    /// The organisation partition does not cover the respondents exactly.
    PartitionMismatch {
        expected: usize,
        found: usize,
    },
}

impl Error for ScoreErrors {}

impl Display for ScoreErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreErrors::MissingColumn(name) => write!(f, "missing column {:?}", name),
            ScoreErrors::UnknownTheme(name) => write!(f, "unknown theme {:?}", name),
            ScoreErrors::RowWidth {
                row,
                expected,
                found,
            } => write!(
                f,
                "row {} has {} cells, but the header has {} columns",
                row, found, expected
            ),
            ScoreErrors::PartitionMismatch { expected, found } => write!(
                f,
                "the organisation covers {} respondents, but {} respondents answered",
                expected, found
            ),
        }
    }
}
