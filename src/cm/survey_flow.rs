// Survey definitions: authoring, paged collection of answers and exports.

use std::collections::HashMap;
use std::fmt::Display;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use bincode::{deserialize_from, serialize_into};
use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use snafu::{prelude::*, Snafu};
use survey_scores::ThemeCatalog;

/// The positions of the six-point selector, in display order.
pub const LIKERT_OPTIONS: [&str; 6] = ["-3", "-2", "-1", "1", "2", "3"];

/// Authoring forms have this many answer slots.
pub const CHOICE_SLOTS: usize = 5;

const EXPORT_PREFIX: &str = "survey_";
const EXPORT_SUFFIX: &str = ".bin.gz";

#[derive(Debug, Snafu)]
pub enum SurveyError {
    #[snafu(display("Question {text:?} is not on page {page}"))]
    UnknownQuestion { text: String, page: usize },
    #[snafu(display("Question {text:?} expects a {kind} answer"))]
    WrongAnswerKind { text: String, kind: QuestionType },
    #[snafu(display("{value:?} is not a position of the scale for question {text:?}"))]
    InvalidLikert { text: String, value: String },
    #[snafu(display("{value:?} is not one of the options of question {text:?}"))]
    InvalidChoice { text: String, value: String },
    #[snafu(display("At most 5 choices can be provided, found {found}"))]
    TooManyChoices { found: usize },
    #[snafu(display("The survey has no question"))]
    EmptySurvey {},
    #[snafu(display("The survey can only be submitted from the last page ({page} of {pages})"))]
    NotLastPage { page: usize, pages: usize },
    #[snafu(display("Error accessing survey file {path}"))]
    SurveyIo {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error encoding survey file {path}"))]
    SurveyEncoding {
        source: bincode::Error,
        path: String,
    },
    #[snafu(display("Error parsing survey file {path}"))]
    SurveyJson {
        source: serde_json::Error,
        path: String,
    },
}

pub type SurveyResult<T> = Result<T, SurveyError>;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum QuestionType {
    Likert,
    #[serde(rename = "Open question", alias = "Open")]
    Open,
    #[serde(rename = "Multiple choice")]
    MultipleChoice,
}

impl Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuestionType::Likert => "Likert",
            QuestionType::Open => "Open question",
            QuestionType::MultipleChoice => "Multiple choice",
        };
        write!(f, "{}", s)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(rename = "Text")]
    pub text: String,
    /// Only set for multiple choice questions.
    #[serde(rename = "Options", default)]
    pub options: Option<Vec<String>>,
}

/// How a question is presented to the respondent.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Widget<'a> {
    Slider {
        options: &'static [&'static str],
        default: &'static str,
    },
    TextInput,
    MultiSelect { options: &'a [String] },
}

impl Question {
    pub fn likert(text: &str) -> Question {
        Question {
            kind: QuestionType::Likert,
            text: text.to_string(),
            options: None,
        }
    }

    pub fn open(text: &str) -> Question {
        Question {
            kind: QuestionType::Open,
            text: text.to_string(),
            options: None,
        }
    }

    pub fn widget(&self) -> Widget<'_> {
        match self.kind {
            QuestionType::Likert => Widget::Slider {
                options: &LIKERT_OPTIONS,
                default: LIKERT_OPTIONS[0],
            },
            QuestionType::Open => Widget::TextInput,
            QuestionType::MultipleChoice => Widget::MultiSelect {
                options: self.options.as_deref().unwrap_or(&[]),
            },
        }
    }

    /// The answer recorded when the respondent leaves the widget untouched.
    pub fn default_answer(&self) -> Answer {
        match self.kind {
            QuestionType::Likert => Answer::Text(LIKERT_OPTIONS[0].to_string()),
            QuestionType::Open => Answer::Text(String::new()),
            QuestionType::MultipleChoice => Answer::Choices(Vec::new()),
        }
    }

    fn validate(&self, answer: &Answer) -> SurveyResult<()> {
        match (self.kind, answer) {
            (QuestionType::Likert, Answer::Text(v)) => {
                ensure!(
                    LIKERT_OPTIONS.contains(&v.as_str()),
                    InvalidLikertSnafu {
                        text: self.text.clone(),
                        value: v.clone()
                    }
                );
                Ok(())
            }
            (QuestionType::Open, Answer::Text(_)) => Ok(()),
            (QuestionType::MultipleChoice, Answer::Choices(vs)) => {
                let options = self.options.as_deref().unwrap_or(&[]);
                for v in vs {
                    ensure!(
                        options.contains(v),
                        InvalidChoiceSnafu {
                            text: self.text.clone(),
                            value: v.clone()
                        }
                    );
                }
                Ok(())
            }
            (kind, _) => WrongAnswerKindSnafu {
                text: self.text.clone(),
                kind,
            }
            .fail(),
        }
    }
}

/// The content of one submitted authoring form.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuestionForm {
    pub theme: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub text: String,
    /// The answer slots, blank slots included.
    #[serde(default)]
    pub choices: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SurveyTheme {
    pub name: String,
    pub questions: Vec<Question>,
}

/// An ordered list of themes, each with its ordered questions.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurveyDefinition {
    pub themes: Vec<SurveyTheme>,
}

impl SurveyDefinition {
    pub fn new() -> SurveyDefinition {
        SurveyDefinition::default()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.iter().all(|t| t.questions.is_empty())
    }

    pub fn num_questions(&self) -> usize {
        self.themes.iter().map(|t| t.questions.len()).sum()
    }

    pub fn theme(&self, name: &str) -> Option<&SurveyTheme> {
        self.themes.iter().find(|t| t.name == name)
    }

    /// Appends the question of a form to its theme, creating the theme if needed.
    ///
    /// Themes are matched exactly, so case variants are different themes.
    /// Nothing is deduplicated. Only multiple choice questions keep their
    /// non-blank choices.
    pub fn add_question(&mut self, form: QuestionForm) -> SurveyResult<()> {
        ensure!(
            form.choices.len() <= CHOICE_SLOTS,
            TooManyChoicesSnafu {
                found: form.choices.len()
            }
        );
        let options = match form.kind {
            QuestionType::MultipleChoice => Some(
                form.choices
                    .into_iter()
                    .filter(|c| !c.is_empty())
                    .collect(),
            ),
            _ => None,
        };
        let question = Question {
            kind: form.kind,
            text: form.text,
            options,
        };
        debug!("add_question: {:?} -> {:?}", form.theme, question);
        match self.themes.iter_mut().find(|t| t.name == form.theme) {
            Some(theme) => theme.questions.push(question),
            None => self.themes.push(SurveyTheme {
                name: form.theme,
                questions: vec![question],
            }),
        }
        Ok(())
    }

    /// A markdown listing of the draft.
    pub fn describe(&self) -> String {
        if self.themes.is_empty() {
            return "Empty survey, please add a question.".to_string();
        }
        let mut res = String::new();
        for theme in self.themes.iter() {
            res.push_str(&format!("**{}**\n\n", theme.name));
            for q in theme.questions.iter() {
                match (&q.kind, &q.options) {
                    (QuestionType::MultipleChoice, options) => {
                        res.push_str(&format!("- {}: {}\n", q.text, q.kind));
                        for choice in options.iter().flatten() {
                            res.push_str(&format!("    - {}\n", choice));
                        }
                    }
                    (kind, _) => res.push_str(&format!("- {}: {}\n", q.text, kind)),
                }
            }
            res.push('\n');
        }
        res
    }

    pub fn from_json_file(path: &Path) -> SurveyResult<SurveyDefinition> {
        let p = path.display().to_string();
        let contents = fs::read_to_string(path).context(SurveyIoSnafu { path: p.clone() })?;
        serde_json::from_str(&contents).context(SurveyJsonSnafu { path: p })
    }
}

/// The survey given to respondents: the Likert themes followed by a page for comments.
pub fn make_default_survey() -> SurveyDefinition {
    let mut themes: Vec<SurveyTheme> = ThemeCatalog::default()
        .themes
        .iter()
        .map(|t| SurveyTheme {
            name: t.name.clone(),
            questions: t.questions.iter().map(|q| Question::likert(q)).collect(),
        })
        .collect();
    themes.push(SurveyTheme {
        name: "Your comments".to_string(),
        questions: vec![Question::open("Do you have any comments?")],
    });
    SurveyDefinition { themes }
}

/// The file name of an export made at the given time.
pub fn export_file_name(now: &NaiveDateTime) -> String {
    format!(
        "{}{}{}",
        EXPORT_PREFIX,
        now.format("%Y-%m-%d_%H-%M-%S"),
        EXPORT_SUFFIX
    )
}

/// Writes a compressed snapshot of the definition in the given directory.
///
/// An existing export with the same name is overwritten.
pub fn export_survey(
    definition: &SurveyDefinition,
    dir: &Path,
    now: &NaiveDateTime,
) -> SurveyResult<PathBuf> {
    let path = dir.join(export_file_name(now));
    let p = path.display().to_string();
    let file = File::create(&path).context(SurveyIoSnafu { path: p.clone() })?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = std::io::BufWriter::new(encoder);
    serialize_into(&mut writer, definition).context(SurveyEncodingSnafu { path: p.clone() })?;
    let encoder = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context(SurveyIoSnafu { path: p.clone() })?;
    encoder.finish().context(SurveyIoSnafu { path: p.clone() })?;
    info!("Saved survey at {}", p);
    Ok(path)
}

pub fn load_survey(path: &Path) -> SurveyResult<SurveyDefinition> {
    let p = path.display().to_string();
    let file = File::open(path).context(SurveyIoSnafu { path: p.clone() })?;
    let decoder = GzDecoder::new(file);
    let mut reader = std::io::BufReader::new(decoder);
    let definition: SurveyDefinition =
        deserialize_from(&mut reader).context(SurveyEncodingSnafu { path: p })?;
    Ok(definition)
}

/// The exports found in a directory, oldest first.
pub fn list_surveys(dir: &Path) -> SurveyResult<Vec<PathBuf>> {
    let p = dir.display().to_string();
    let mut res: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).context(SurveyIoSnafu { path: p.clone() })? {
        let entry = entry.context(SurveyIoSnafu { path: p.clone() })?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(EXPORT_PREFIX) && name.ends_with(EXPORT_SUFFIX) {
            res.push(entry.path());
        }
    }
    // The timestamp format sorts chronologically.
    res.sort();
    Ok(res)
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Choices(Vec<String>),
}

/// One page of the survey: a theme and its questions.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Page<'a> {
    pub index: usize,
    pub theme: &'a str,
    pub questions: &'a [Question],
}

/// A respondent going through the survey, one theme per page.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SurveySession {
    definition: SurveyDefinition,
    user: String,
    page: usize,
    answers: HashMap<String, Answer>,
}

impl SurveySession {
    pub fn new(definition: SurveyDefinition, user: &str) -> SurveyResult<SurveySession> {
        ensure!(!definition.themes.is_empty(), EmptySurveySnafu {});
        Ok(SurveySession {
            definition,
            user: user.to_string(),
            page: 0,
            answers: HashMap::new(),
        })
    }

    pub fn num_pages(&self) -> usize {
        self.definition.themes.len()
    }

    pub fn current_page(&self) -> Page<'_> {
        let theme = &self.definition.themes[self.page];
        Page {
            index: self.page,
            theme: theme.name.as_str(),
            questions: theme.questions.as_slice(),
        }
    }

    pub fn is_last_page(&self) -> bool {
        self.page + 1 == self.num_pages()
    }

    /// Moves to the next page. Returns false on the last page.
    pub fn next(&mut self) -> bool {
        if self.is_last_page() {
            return false;
        }
        self.page += 1;
        true
    }

    /// Moves to the previous page. Returns false on the first page.
    pub fn previous(&mut self) -> bool {
        if self.page == 0 {
            return false;
        }
        self.page -= 1;
        true
    }

    /// Records the answer to a question of the current page.
    pub fn answer(&mut self, text: &str, answer: Answer) -> SurveyResult<()> {
        let page = self.page;
        let question = self.definition.themes[page]
            .questions
            .iter()
            .find(|q| q.text == text)
            .context(UnknownQuestionSnafu { text, page })?;
        question.validate(&answer)?;
        self.answers.insert(text.to_string(), answer);
        Ok(())
    }

    /// Collects every answer of the survey, with the respondent and the time.
    ///
    /// Questions left untouched take the default value of their widget.
    pub fn submit<F>(&self, now: NaiveDateTime, on_complete: F) -> SurveyResult<SurveyResponse>
    where
        F: FnOnce(&SurveyResponse),
    {
        ensure!(
            self.is_last_page(),
            NotLastPageSnafu {
                page: self.page + 1,
                pages: self.num_pages()
            }
        );
        let mut answers: Vec<(String, Answer)> = Vec::new();
        for theme in self.definition.themes.iter() {
            for q in theme.questions.iter() {
                let answer = match self.answers.get(&q.text) {
                    Some(a) => a.clone(),
                    None => {
                        debug!("submit: no answer for {:?}, using the default", q.text);
                        q.default_answer()
                    }
                };
                if answers.iter().any(|(t, _)| t == &q.text) {
                    warn!("submit: question {:?} appears twice in the survey", q.text);
                    continue;
                }
                answers.push((q.text.clone(), answer));
            }
        }
        let response = SurveyResponse {
            user: self.user.clone(),
            datetime: now,
            answers,
        };
        on_complete(&response);
        Ok(response)
    }
}

/// The answers of one respondent, keyed by question text.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SurveyResponse {
    pub user: String,
    pub datetime: NaiveDateTime,
    pub answers: Vec<(String, Answer)>,
}

impl SurveyResponse {
    pub fn answer(&self, text: &str) -> Option<&Answer> {
        self.answers.iter().find(|(t, _)| t == text).map(|(_, a)| a)
    }

    /// The flat record shown back to the respondent.
    pub fn to_json(&self) -> JSValue {
        let mut m: JSMap<String, JSValue> = JSMap::new();
        for (text, answer) in self.answers.iter() {
            m.insert(text.clone(), json!(answer));
        }
        m.insert("user".to_string(), json!(self.user));
        m.insert(
            "datetime".to_string(),
            json!(self.datetime.format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        JSValue::Object(m)
    }
}
