pub mod builder;
mod config;
pub mod manual;

use log::{debug, info, warn};

use std::collections::HashMap;

pub use crate::config::*;

// **** Private structures ****

// The scores of one respondent, in the order of the rows and then of the questions.
#[derive(PartialEq, Debug, Clone)]
struct RespondentScores {
    id: RespondentId,
    values: Vec<f64>,
}

// Counts of answers, indexed like Score::ALL.
type ScoreCounts = [u64; 6];

/// Returns all the question columns and the numeric ones among them.
///
/// Questions are the columns from index 6 onward, except the `ID` column.
/// A question is numeric if none of its cells holds text. A table with fewer
/// than 7 columns has no questions.
pub fn extract_questions(table: &ResponseTable) -> (Vec<String>, Vec<String>) {
    extract_questions_at(table, &TableLayout::default())
}

/// Same as [`extract_questions`], with the question columns and the ID column
/// of the given layout.
pub fn extract_questions_at(
    table: &ResponseTable,
    layout: &TableLayout,
) -> (Vec<String>, Vec<String>) {
    let candidates: Vec<(usize, &String)> = table
        .columns()
        .iter()
        .enumerate()
        .skip(layout.first_question_column)
        .filter(|(_, name)| **name != layout.id_column)
        .collect();
    let questions: Vec<String> = candidates.iter().map(|(_, name)| (*name).clone()).collect();
    let num_questions: Vec<String> = candidates
        .iter()
        .filter(|(idx, _)| table.is_numeric_column(*idx))
        .map(|(_, name)| (*name).clone())
        .collect();
    debug!(
        "extract_questions: {} questions, {} numeric",
        questions.len(),
        num_questions.len()
    );
    (questions, num_questions)
}

/// The distinct respondent identifiers of the `ID` column, in order of first occurrence.
pub fn extract_users(table: &ResponseTable) -> Result<Vec<RespondentId>, ScoreErrors> {
    extract_users_from(table, TableLayout::default().id_column.as_str())
}

pub fn extract_users_from(
    table: &ResponseTable,
    id_column: &str,
) -> Result<Vec<RespondentId>, ScoreErrors> {
    let id_idx = find_column(table, id_column)?;
    let mut res: Vec<RespondentId> = Vec::new();
    for cell in table.column(id_idx) {
        if let Some(s) = cell.display_value() {
            let id = RespondentId(s);
            if !res.contains(&id) {
                res.push(id);
            }
        }
    }
    Ok(res)
}

/// Shifts raw answers onto the {-3,-2,-1,1,2,3} scale.
///
/// A column is shifted when its maximum exceeds 3 or its minimum exceeds 0.
/// Shifting maps values above 3 to `x - 3` and the other ones to `x - 4`.
/// The decision is made per column, so a column that mixes valid and raw
/// values is shifted as a whole. Applying this function twice corrupts the data.
pub fn rescale_columns(table: &mut ResponseTable, num_questions: &[String]) {
    for question in num_questions {
        let idx = match table.column_index(question) {
            Some(idx) => idx,
            None => {
                warn!("rescale_columns: question {:?} not in the table", question);
                continue;
            }
        };
        let values: Vec<f64> = table.column_values(idx).collect();
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        if values.is_empty() || !(max > 3.0 || min > 0.0) {
            continue;
        }
        debug!(
            "rescale_columns: shifting {:?} (min {}, max {})",
            question, min, max
        );
        for row in table.rows.iter_mut() {
            if let Some(Cell::Number(x)) = row.get_mut(idx) {
                *x = if *x > 3.0 { *x - 3.0 } else { *x - 4.0 };
            }
        }
    }
}

/// For each theme of the catalog, the canonical questions present among `num_questions`.
///
/// The themes keep the order of the catalog and the questions keep their canonical order.
pub fn group_questions(num_questions: &[String], catalog: &ThemeCatalog) -> Vec<QuestionGroup> {
    catalog
        .themes
        .iter()
        .map(|theme| QuestionGroup {
            theme: theme.name.clone(),
            questions: theme
                .questions
                .iter()
                .filter(|q| num_questions.contains(q))
                .cloned()
                .collect(),
        })
        .collect()
}

/// The distribution of the scores for each question of a theme.
///
/// Every (question, score) pair is present, with zero counts for the scores nobody gave.
pub fn plot_scores_questions(
    table: &ResponseTable,
    theme: &str,
    groups: &[QuestionGroup],
) -> Result<StackedBarChart, ScoreErrors> {
    let group = groups
        .iter()
        .find(|g| g.theme == theme)
        .ok_or_else(|| ScoreErrors::UnknownTheme(theme.to_string()))?;

    let mut counts: Vec<ScoreCounts> = Vec::new();
    for question in group.questions.iter() {
        let idx = find_column(table, question)?;
        counts.push(count_scores(table.column_values(idx), question));
    }
    debug!(
        "plot_scores_questions: theme {:?}: counts {:?}",
        theme, counts
    );
    let categories = group.questions.iter().map(|q| wrap_label(q)).collect();
    Ok(stacked_chart(
        "Question",
        group.questions.clone(),
        categories,
        &counts,
    ))
}

/// The distribution of the scores given by each respondent, over all the numeric questions.
pub fn plot_scores_users(
    table: &ResponseTable,
    id_column: &str,
    num_questions: &[String],
    selection: &RespondentSelection,
    order: RespondentOrder,
) -> Result<StackedBarChart, ScoreErrors> {
    let mut respondents: Vec<RespondentScores> = stack_by_respondent(table, id_column, num_questions)?
        .into_iter()
        .filter(|rs| selection.contains(&rs.id))
        .collect();

    respondents.sort_by(|a, b| a.id.cmp(&b.id));
    if order == RespondentOrder::MedianScore {
        respondents.sort_by(|a, b| median(&a.values).total_cmp(&median(&b.values)));
    }

    let keys: Vec<String> = respondents.iter().map(|rs| rs.id.0.clone()).collect();
    let counts: Vec<ScoreCounts> = respondents
        .iter()
        .map(|rs| count_scores(rs.values.iter().cloned(), rs.id.as_str()))
        .collect();
    Ok(stacked_chart("ID", keys.clone(), keys, &counts))
}

/// The mean score of each numeric question, in increasing order.
///
/// Questions without any answer have no mean and are left out.
pub fn question_averages(table: &ResponseTable, num_questions: &[String]) -> Vec<(String, f64)> {
    let mut res: Vec<(String, f64)> = Vec::new();
    for question in num_questions {
        let values: Vec<f64> = match table.column_index(question) {
            Some(idx) => table.column_values(idx).collect(),
            None => Vec::new(),
        };
        if values.is_empty() {
            debug!("question_averages: no answer for {:?}", question);
            continue;
        }
        res.push((question.clone(), mean(&values)));
    }
    res.sort_by(|a, b| a.1.total_cmp(&b.1));
    res
}

/// The three questions with the highest (`top`) or lowest average score.
///
/// The bars are in increasing order of average in both cases.
pub fn plot_scores_top(
    table: &ResponseTable,
    num_questions: &[String],
    top: bool,
) -> AverageBarChart {
    let averages = question_averages(table, num_questions);
    let selected: &[(String, f64)] = if top {
        &averages[averages.len().saturating_sub(3)..]
    } else {
        &averages[..averages.len().min(3)]
    };
    let bars = selected
        .iter()
        .map(|(question, average)| AverageBar {
            question: question.clone(),
            label: wrap_label(question),
            average: *average,
            color: continuous_color(*average),
        })
        .collect();
    AverageBarChart {
        bars,
        y_range: SCORE_RANGE,
        color_range: SCORE_RANGE,
        palette: palette(),
    }
}

/// The mean score of every respondent, arranged in the department/team hierarchy.
///
/// Respondents, taken in the natural order of their identifiers, are assigned
/// to the organisation units one slice after the other. The organisation must
/// cover the respondents exactly.
pub fn score_treemap(
    table: &ResponseTable,
    id_column: &str,
    num_questions: &[String],
    organization: &[OrgUnit],
) -> Result<Treemap, ScoreErrors> {
    let mut respondents = stack_by_respondent(table, id_column, num_questions)?;
    respondents.sort_by(|a, b| a.id.cmp(&b.id));

    let expected: usize = organization.iter().map(|u| u.size).sum();
    if expected != respondents.len() {
        return Err(ScoreErrors::PartitionMismatch {
            expected,
            found: respondents.len(),
        });
    }

    // (department, team, respondent, mean)
    let mut leaves: Vec<(&str, &str, &RespondentId, f64)> = Vec::new();
    let mut remaining = respondents.iter();
    for unit in organization {
        for rs in remaining.by_ref().take(unit.size) {
            leaves.push((
                unit.department.as_str(),
                unit.team.as_str(),
                &rs.id,
                mean(&rs.values),
            ));
        }
    }

    let mut departments: Vec<&str> = Vec::new();
    let mut teams: Vec<(&str, &str)> = Vec::new();
    for &(department, team, _, _) in leaves.iter() {
        if !departments.contains(&department) {
            departments.push(department);
        }
        if !teams.contains(&(department, team)) {
            teams.push((department, team));
        }
    }

    let root = "all".to_string();
    let all_means: Vec<f64> = leaves.iter().map(|l| l.3).collect();
    let mut nodes = vec![treemap_node(root.clone(), None, "all", &all_means)];
    for department in departments {
        let dept_means: Vec<f64> = leaves
            .iter()
            .filter(|l| l.0 == department)
            .map(|l| l.3)
            .collect();
        let dept_id = format!("{}/{}", root, department);
        nodes.push(treemap_node(
            dept_id.clone(),
            Some(root.clone()),
            department,
            &dept_means,
        ));
        for (_, team) in teams.iter().filter(|(d, _)| *d == department) {
            let team_leaves: Vec<&(&str, &str, &RespondentId, f64)> = leaves
                .iter()
                .filter(|l| l.0 == department && l.1 == *team)
                .collect();
            let team_means: Vec<f64> = team_leaves.iter().map(|l| l.3).collect();
            let team_id = format!("{}/{}", dept_id, team);
            nodes.push(treemap_node(
                team_id.clone(),
                Some(dept_id.clone()),
                team,
                &team_means,
            ));
            for (_, _, id, avg) in team_leaves {
                nodes.push(treemap_node(
                    format!("{}/{}", team_id, id),
                    Some(team_id.clone()),
                    id.as_str(),
                    &[*avg],
                ));
            }
        }
    }

    Ok(Treemap {
        nodes,
        color_range: SCORE_RANGE,
        palette: palette(),
    })
}

/// Runs the complete dashboard pipeline on a freshly imported table.
///
/// Arguments:
/// * `table` the imported table, with raw scores
/// * `rules` the layout, themes and organisation
/// * `themes` the themes to chart; all the themes of the catalog if not provided
/// * `selection` the respondents shown in the per-respondent chart
/// * `order` the order of the respondents in that chart
pub fn run_dashboard_stats(
    mut table: ResponseTable,
    rules: &ScoreRules,
    themes: Option<&[String]>,
    selection: &RespondentSelection,
    order: RespondentOrder,
) -> Result<DashboardSummary, ScoreErrors> {
    info!(
        "Processing {} responses over {} columns",
        table.num_rows(),
        table.columns().len()
    );
    let (questions, num_questions) = extract_questions_at(&table, &rules.layout);
    let groups = group_questions(&num_questions, &rules.themes);
    let respondents = extract_users_from(&table, &rules.layout.id_column)?;
    info!(
        "Found {} numeric questions and {} respondents",
        num_questions.len(),
        respondents.len()
    );
    rescale_columns(&mut table, &num_questions);

    let id_column = rules.layout.id_column.as_str();
    let treemap = score_treemap(&table, id_column, &num_questions, &rules.organization)?;
    let bottom_questions = plot_scores_top(&table, &num_questions, false);
    let top_questions = plot_scores_top(&table, &num_questions, true);

    let theme_names: Vec<String> = match themes {
        Some(names) => names.to_vec(),
        None => groups.iter().map(|g| g.theme.clone()).collect(),
    };
    let mut question_charts: Vec<ThemeChart> = Vec::new();
    for theme in theme_names {
        let chart = plot_scores_questions(&table, &theme, &groups)?;
        question_charts.push(ThemeChart { theme, chart });
    }
    let respondent_chart = plot_scores_users(&table, id_column, &num_questions, selection, order)?;

    Ok(DashboardSummary {
        questions,
        numeric_questions: num_questions,
        respondents,
        groups,
        treemap,
        bottom_questions,
        top_questions,
        question_charts,
        respondent_chart,
    })
}

/// Wraps a label at [`WRAP_WIDTH`] characters, joining the lines with [`LINE_BREAK`].
pub fn wrap_label(text: &str) -> String {
    wrap_text(text, WRAP_WIDTH).join(LINE_BREAK)
}

/// Greedy word wrapping. Words longer than the width are cut.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word;
        loop {
            let current_len = current.chars().count();
            let word_len = word.chars().count();
            let needed = if current_len == 0 {
                word_len
            } else {
                current_len + 1 + word_len
            };
            if needed <= width {
                if current_len > 0 {
                    current.push(' ');
                }
                current.push_str(word);
                break;
            }
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                continue;
            }
            let split = word
                .char_indices()
                .nth(width)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            lines.push(word[..split].to_string());
            word = &word[split..];
            if word.is_empty() {
                break;
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// The colour of a value on the continuous palette scale over [`SCORE_RANGE`].
///
/// The palette colours are evenly spaced over the range and interpolated linearly.
/// Values outside the range are clamped.
pub fn continuous_color(value: f64) -> String {
    let (low, high) = SCORE_RANGE;
    let t = if value.is_nan() {
        0.5
    } else {
        ((value - low) / (high - low)).clamp(0.0, 1.0)
    };
    let segments = (PALETTE_RGB.len() - 1) as f64;
    let pos = t * segments;
    let idx = (pos.floor() as usize).min(PALETTE_RGB.len() - 2);
    let frac = pos - idx as f64;
    let (r0, g0, b0) = PALETTE_RGB[idx];
    let (r1, g1, b1) = PALETTE_RGB[idx + 1];
    let lerp = |a: u8, b: u8| -> u8 { (a as f64 + (b as f64 - a as f64) * frac).round() as u8 };
    format!(
        "#{:02X}{:02X}{:02X}",
        lerp(r0, r1),
        lerp(g0, g1),
        lerp(b0, b1)
    )
}

fn palette() -> Vec<String> {
    PALETTE.iter().map(|c| c.to_string()).collect()
}

fn find_column(table: &ResponseTable, name: &str) -> Result<usize, ScoreErrors> {
    table
        .column_index(name)
        .ok_or_else(|| ScoreErrors::MissingColumn(name.to_string()))
}

// Groups all the numeric answers by respondent, in order of first occurrence.
// Respondents who did not answer any question are dropped.
fn stack_by_respondent(
    table: &ResponseTable,
    id_column: &str,
    num_questions: &[String],
) -> Result<Vec<RespondentScores>, ScoreErrors> {
    let id_idx = find_column(table, id_column)?;
    let question_idxs: Vec<usize> = num_questions
        .iter()
        .map(|q| find_column(table, q))
        .collect::<Result<_, _>>()?;

    let mut positions: HashMap<RespondentId, usize> = HashMap::new();
    let mut res: Vec<RespondentScores> = Vec::new();
    for row in table.rows() {
        let id = match row.get(id_idx).and_then(|c| c.display_value()) {
            Some(s) => RespondentId(s),
            None => continue,
        };
        let values: Vec<f64> = question_idxs
            .iter()
            .filter_map(|idx| row.get(*idx).and_then(|c| c.as_number()))
            .collect();
        if values.is_empty() {
            continue;
        }
        match positions.get(&id) {
            Some(pos) => res[*pos].values.extend(values),
            None => {
                positions.insert(id.clone(), res.len());
                res.push(RespondentScores { id, values });
            }
        }
    }
    Ok(res)
}

fn count_scores(values: impl Iterator<Item = f64>, context: &str) -> ScoreCounts {
    let mut counts: ScoreCounts = [0; 6];
    for value in values {
        match Score::from_value(value) {
            Some(score) => counts[score.position()] += 1,
            None => warn!(
                "count_scores: {:?}: value {} is not a valid score, skipping",
                context, value
            ),
        }
    }
    counts
}

fn stacked_chart(
    x_title: &str,
    keys: Vec<String>,
    categories: Vec<String>,
    counts: &[ScoreCounts],
) -> StackedBarChart {
    let series = Score::ALL
        .iter()
        .enumerate()
        .map(|(pos, score)| ScoreSeries {
            score: *score,
            color: score.color().to_string(),
            counts: counts.iter().map(|c| c[pos]).collect(),
        })
        .collect();
    StackedBarChart {
        x_title: x_title.to_string(),
        keys,
        categories,
        series,
        height: CHART_HEIGHT,
    }
}

fn treemap_node(id: String, parent: Option<String>, label: &str, means: &[f64]) -> TreemapNode {
    let average = mean(means);
    TreemapNode {
        id,
        parent,
        label: label.to_string(),
        respondents: means.len(),
        average,
        color: continuous_color(average),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::builder::TableBuilder;
    use super::*;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn header(questions: &[&str]) -> Vec<String> {
        let mut cols: Vec<String> = vec!["Start", "End", "Email", "Name", "Team", "ID"]
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        cols.extend(questions.iter().map(|s| s.to_string()));
        cols
    }

    fn row(id: &str, answers: &[&str]) -> Vec<Cell> {
        let mut cells = vec![
            Cell::Text("2023-01-01".to_string()),
            Cell::Text("2023-01-02".to_string()),
            Cell::Text(format!("{}@example.com", id)),
            Cell::Text(id.to_string()),
            Cell::Empty,
            Cell::parse(id),
        ];
        cells.extend(answers.iter().map(|a| Cell::parse(a)));
        cells
    }

    fn table(questions: &[&str], rows: &[(&str, Vec<&str>)]) -> ResponseTable {
        let mut builder = TableBuilder::new(&header(questions));
        for (id, answers) in rows {
            builder.add_row(row(id, answers)).unwrap();
        }
        builder.build()
    }

    fn strings(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    // 13 respondents with raw answers between 1 and 6.
    fn pilot_table() -> ResponseTable {
        let rows: Vec<(String, Vec<String>)> = (1..=13)
            .map(|i| {
                let q1 = ((i - 1) % 6 + 1).to_string();
                let q2 = ((i + 2) % 6 + 1).to_string();
                (i.to_string(), vec![q1, q2, "no comment".to_string()])
            })
            .collect();
        let mut builder = TableBuilder::new(&header(&[
            "I do feel I belong to the team",
            "I do feel I am supported",
            "Comments",
        ]));
        for (id, answers) in rows.iter() {
            let answers: Vec<&str> = answers.iter().map(|s| s.as_str()).collect();
            builder.add_row(row(id, &answers)).unwrap();
        }
        builder.build()
    }

    #[test]
    fn extract_questions_splits_numeric_and_text() {
        let t = table(
            &["Q1", "Q2", "Comments"],
            &[("1", vec!["4", "", "great"]), ("2", vec!["5", "6", ""])],
        );
        let (questions, num_questions) = extract_questions(&t);
        assert_eq!(questions, strings(&["Q1", "Q2", "Comments"]));
        assert_eq!(num_questions, strings(&["Q1", "Q2"]));
    }

    #[test]
    fn extract_questions_narrow_table() {
        let mut builder = TableBuilder::new(&strings(&["A", "B", "ID"]));
        builder.add_row_simple(&["x", "y", "1"]).unwrap();
        let (questions, num_questions) = extract_questions(&builder.build());
        assert!(questions.is_empty());
        assert!(num_questions.is_empty());
    }

    #[test]
    fn extract_users_first_occurrence() {
        let t = table(
            &["Q1"],
            &[
                ("b", vec!["1"]),
                ("a", vec!["2"]),
                ("b", vec!["3"]),
                ("c", vec!["4"]),
                ("a", vec!["5"]),
            ],
        );
        let users = extract_users(&t).unwrap();
        let names: Vec<&str> = users.iter().map(|u| u.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn extract_users_missing_id_column() {
        let mut builder = TableBuilder::new(&strings(&["Name", "Q1"]));
        builder.add_row_simple(&["x", "1"]).unwrap();
        assert_eq!(
            extract_users(&builder.build()),
            Err(ScoreErrors::MissingColumn("ID".to_string()))
        );
    }

    #[test]
    fn rescale_raw_scale() {
        let mut t = table(
            &["Q1"],
            &[
                ("1", vec!["1"]),
                ("2", vec!["2"]),
                ("3", vec!["3"]),
                ("4", vec!["4"]),
                ("5", vec!["5"]),
                ("6", vec!["6"]),
            ],
        );
        rescale_columns(&mut t, &strings(&["Q1"]));
        let idx = t.column_index("Q1").unwrap();
        let values: Vec<f64> = t.column_values(idx).collect();
        assert_eq!(values, vec![-3.0, -2.0, -1.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn rescale_is_noop_on_valid_scores() {
        let original = table(
            &["Q1", "Q2"],
            &[
                ("1", vec!["-3", "3"]),
                ("2", vec!["-1", ""]),
                ("3", vec!["2", "-2"]),
            ],
        );
        let mut t = original.clone();
        rescale_columns(&mut t, &strings(&["Q1", "Q2"]));
        assert_eq!(t, original);
    }

    #[test]
    fn rescale_mixed_column_is_shifted_uniformly() {
        let mut t = table(&["Q1"], &[("1", vec!["-2"]), ("2", vec!["5"])]);
        rescale_columns(&mut t, &strings(&["Q1"]));
        let idx = t.column_index("Q1").unwrap();
        let values: Vec<f64> = t.column_values(idx).collect();
        assert_eq!(values, vec![-6.0, 2.0]);
    }

    #[test]
    fn group_questions_keeps_canonical_order() {
        let num_questions = strings(&[
            "I feel that I am not judged or evaluated",
            "I do feel I am supported",
            "Something else",
        ]);
        let groups = group_questions(&num_questions, &ThemeCatalog::default());
        assert_eq!(groups.len(), 6);
        let safe = groups
            .iter()
            .find(|g| g.theme == "Safe environment")
            .unwrap();
        assert_eq!(
            safe.questions,
            strings(&[
                "I do feel I am supported",
                "I feel that I am not judged or evaluated"
            ])
        );
        let belonging = groups
            .iter()
            .find(|g| g.theme == "Sense of belonging")
            .unwrap();
        assert!(belonging.questions.is_empty());
    }

    #[test]
    fn question_distribution_zero_fills() {
        init_logs();
        let mut t = table(
            &["I do feel I am supported", "I feel I am in a safe environment"],
            &[
                ("1", vec!["1", "6"]),
                ("2", vec!["1", ""]),
                ("3", vec!["6", "6"]),
            ],
        );
        let (_, num_questions) = extract_questions(&t);
        rescale_columns(&mut t, &num_questions);
        let groups = group_questions(&num_questions, &ThemeCatalog::default());
        let chart = plot_scores_questions(&t, "Safe environment", &groups).unwrap();

        assert_eq!(chart.series.len(), 6);
        for series in chart.series.iter() {
            assert_eq!(series.counts.len(), 2);
        }
        let q1 = "I do feel I am supported";
        let q2 = "I feel I am in a safe environment";
        assert_eq!(chart.count(q1, Score::new(-3).unwrap()), Some(2));
        assert_eq!(chart.count(q1, Score::new(3).unwrap()), Some(1));
        assert_eq!(chart.count(q1, Score::new(1).unwrap()), Some(0));
        assert_eq!(chart.total(q1), Some(3));
        assert_eq!(chart.total(q2), Some(2));
        let colors: Vec<&str> = chart.series.iter().map(|s| s.color.as_str()).collect();
        assert_eq!(colors, PALETTE.to_vec());
    }

    #[test]
    fn question_distribution_unknown_theme() {
        let t = table(&["Q1"], &[("1", vec!["1"])]);
        let groups = group_questions(&strings(&["Q1"]), &ThemeCatalog::default());
        assert_eq!(
            plot_scores_questions(&t, "Nope", &groups),
            Err(ScoreErrors::UnknownTheme("Nope".to_string()))
        );
    }

    #[test]
    fn respondent_distribution_filters_and_orders() {
        let t = table(
            &["Q1", "Q2", "Q3"],
            &[
                ("10", vec!["3", "3", "2"]),
                ("2", vec!["-3", "-3", "1"]),
                ("7", vec!["1", "-1", "1"]),
            ],
        );
        let (_, num_questions) = extract_questions(&t);

        let all = RespondentSelection::from_labels(&strings(&["All", "2"]));
        let by_id = plot_scores_users(&t, "ID", &num_questions, &all, RespondentOrder::Identifier)
            .unwrap();
        assert_eq!(by_id.keys, strings(&["2", "7", "10"]));

        let by_median =
            plot_scores_users(&t, "ID", &num_questions, &all, RespondentOrder::MedianScore)
                .unwrap();
        assert_eq!(by_median.keys, strings(&["2", "7", "10"]));
        assert_eq!(by_median.total("10"), Some(3));
        assert_eq!(by_median.count("2", Score::new(-3).unwrap()), Some(2));

        let some = RespondentSelection::from_labels(&strings(&["10", "7"]));
        let filtered =
            plot_scores_users(&t, "ID", &num_questions, &some, RespondentOrder::MedianScore)
                .unwrap();
        assert_eq!(filtered.keys, strings(&["7", "10"]));
    }

    #[test]
    fn top_and_bottom_partition_six_questions() {
        let questions = ["Q1", "Q2", "Q3", "Q4", "Q5", "Q6"];
        let t = table(
            &questions,
            &[
                ("1", vec!["-3", "3", "1", "-1", "2", "-2"]),
                ("2", vec!["-3", "3", "2", "-1", "2", "-3"]),
            ],
        );
        let (_, num_questions) = extract_questions(&t);
        let top = plot_scores_top(&t, &num_questions, true);
        let bottom = plot_scores_top(&t, &num_questions, false);

        let top_q: Vec<&str> = top.bars.iter().map(|b| b.question.as_str()).collect();
        let bottom_q: Vec<&str> = bottom.bars.iter().map(|b| b.question.as_str()).collect();
        assert_eq!(bottom_q, vec!["Q1", "Q6", "Q4"]);
        assert_eq!(top_q, vec!["Q3", "Q5", "Q2"]);
        let mut all: Vec<&str> = top_q.iter().chain(bottom_q.iter()).cloned().collect();
        all.sort();
        assert_eq!(all, questions.to_vec());

        assert_eq!(top.bars[2].color, "#1A9850");
        assert_eq!(bottom.bars[0].color, "#D73027");
        assert_eq!(top.y_range, (-3.0, 3.0));
    }

    #[test]
    fn continuous_color_scale() {
        assert_eq!(continuous_color(-3.0), "#D73027");
        assert_eq!(continuous_color(3.0), "#1A9850");
        assert_eq!(continuous_color(10.0), "#1A9850");
        assert_eq!(continuous_color(-1.8), "#FC8D59");
        // Midway between the yellow and the light green.
        assert_eq!(continuous_color(0.0), "#ECE88B");
    }

    #[test]
    fn wrap_at_thirty_characters() {
        assert_eq!(
            wrap_label("I am aware that we depend on each other within my team to be able to deliver"),
            "I am aware that we depend on<br>each other within my team to<br>be able to deliver"
        );
        assert_eq!(wrap_label("short"), "short");
        assert_eq!(
            wrap_text(&"x".repeat(65), 30),
            vec!["x".repeat(30), "x".repeat(30), "x".repeat(5)]
        );
    }

    #[test]
    fn treemap_partition_of_thirteen() {
        let mut t = pilot_table();
        let (_, num_questions) = extract_questions(&t);
        rescale_columns(&mut t, &num_questions);
        let tm = score_treemap(&t, "ID", &num_questions, &OrgUnit::default_partition()).unwrap();

        let root = tm.node("all").unwrap();
        assert_eq!(root.respondents, 13);
        let depts = tm.children("all");
        assert_eq!(depts.len(), 2);
        assert_eq!(depts[0].label, "Department of Mental health");
        assert_eq!(depts[0].respondents, 5);
        assert_eq!(depts[1].label, "Department of Informatics");
        assert_eq!(depts[1].respondents, 8);

        let teams: Vec<(String, usize)> = tm
            .children(&depts[1].id)
            .iter()
            .map(|n| (n.label.clone(), n.respondents))
            .collect();
        assert_eq!(
            teams,
            vec![
                ("Team Agilopathes".to_string(), 3),
                ("Team Collaboration".to_string(), 5)
            ]
        );
        let first_team = tm.children(&tm.children(&depts[0].id)[0].id);
        let ids: Vec<&str> = first_team.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn treemap_rejects_wrong_respondent_count() {
        let t = table(&["Q1"], &[("1", vec!["1"]), ("2", vec!["2"])]);
        let res = score_treemap(&t, "ID", &strings(&["Q1"]), &OrgUnit::default_partition());
        assert_eq!(
            res,
            Err(ScoreErrors::PartitionMismatch {
                expected: 13,
                found: 2
            })
        );
    }

    #[test]
    fn treemap_parent_color_is_mean_of_leaves() {
        let t = table(&["Q1"], &[("1", vec!["-3"]), ("2", vec!["3"])]);
        let org = vec![OrgUnit::new("D", "T", 2)];
        let tm = score_treemap(&t, "ID", &strings(&["Q1"]), &org).unwrap();
        let team = tm.node("all/D/T").unwrap();
        assert_eq!(team.average, 0.0);
        assert_eq!(team.color, continuous_color(0.0));
        assert_eq!(tm.node("all/D/T/1").unwrap().color, "#D73027");
    }

    #[test]
    fn dashboard_end_to_end() {
        init_logs();
        let rules = ScoreRules::with_default_organization();
        let summary = run_dashboard_stats(
            pilot_table(),
            &rules,
            None,
            &RespondentSelection::All,
            RespondentOrder::MedianScore,
        )
        .unwrap();

        assert_eq!(summary.respondents.len(), 13);
        assert_eq!(summary.numeric_questions.len(), 2);
        let belonging = summary
            .question_charts
            .iter()
            .find(|c| c.theme == "Sense of belonging")
            .unwrap();
        assert_eq!(belonging.chart.series.len(), 6);
        assert_eq!(
            belonging.chart.total("I do feel I belong to the team"),
            Some(13)
        );
        assert_eq!(summary.top_questions.bars.len(), 2);
        assert_eq!(summary.respondent_chart.keys.len(), 13);

        let js = serde_json::to_value(&summary).unwrap();
        assert!(js["treemap"]["nodes"].is_array());
    }

    // Six metadata columns followed by the ID column and two raw questions.
    #[test]
    fn dashboard_with_id_among_question_columns() {
        init_logs();
        let columns = strings(&["M0", "M1", "M2", "M3", "M4", "M5", "ID", "Q1", "Q2"]);
        let mut builder = TableBuilder::new(&columns);
        for i in 0..13 {
            let id = (101 + i).to_string();
            let q1 = (i % 6 + 1).to_string();
            let q2 = ((i + 3) % 6 + 1).to_string();
            let cells = ["", "", "", "", "", "", id.as_str(), q1.as_str(), q2.as_str()];
            builder.add_row_simple(&cells).unwrap();
        }
        let rules = ScoreRules {
            themes: ThemeCatalog {
                themes: vec![Theme::new("T", &["Q1", "Q2"])],
            },
            organization: vec![
                OrgUnit::new("A", "A1", 5),
                OrgUnit::new("B", "B1", 3),
                OrgUnit::new("B", "B2", 5),
            ],
            ..Default::default()
        };
        let summary = run_dashboard_stats(
            builder.build(),
            &rules,
            None,
            &RespondentSelection::from_labels(&strings(&["113", "101"])),
            RespondentOrder::Identifier,
        )
        .unwrap();

        assert_eq!(summary.questions, strings(&["Q1", "Q2"]));
        assert_eq!(summary.numeric_questions, strings(&["Q1", "Q2"]));
        let ids: Vec<&str> = summary.respondents.iter().map(|r| r.as_str()).collect();
        let expected: Vec<String> = (101..=113).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected.iter().map(|s| s.as_str()).collect::<Vec<_>>());
        assert_eq!(summary.respondent_chart.keys, strings(&["101", "113"]));

        let chart = &summary.question_charts[0].chart;
        assert_eq!(chart.series.len(), 6);
        assert_eq!(chart.total("Q1"), Some(13));
        assert_eq!(chart.count("Q1", Score::new(-3).unwrap()), Some(3));
        assert!(summary
            .top_questions
            .bars
            .iter()
            .chain(summary.bottom_questions.bars.iter())
            .all(|b| b.question != "ID"));

        let tm = &summary.treemap;
        assert_eq!(tm.node("all/A").unwrap().respondents, 5);
        assert_eq!(tm.node("all/B").unwrap().respondents, 8);
        assert_eq!(tm.node("all/B/B1").unwrap().respondents, 3);
        assert_eq!(tm.node("all/B/B2").unwrap().respondents, 5);
        let first: Vec<&str> = tm
            .children("all/A/A1")
            .iter()
            .map(|n| n.label.as_str())
            .collect();
        assert_eq!(first, vec!["101", "102", "103", "104", "105"]);
    }
}
