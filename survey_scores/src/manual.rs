/*!

This is the long-form manual for `survey_scores` and `cultmoi`.

## Input tables

The dashboard reads one table of survey responses, with one row per respondent.
The following formats are supported:
* `csv` Comma Separated Values, with the column names in the first row
* `xlsx`, `xls` Excel workbooks. The first worksheet is used unless a worksheet name
  is provided.

The table is expected to be laid out as the exports of Microsoft Forms:

| Start | End | Email | Name | Team | ID | question 1 | question 2 | ... |
|-------|-----|-------|------|------|----|------------|------------|-----|
| ...   | ... | ...   | ...  | ...  | 1  | 4          | 6          |     |

The first six columns are metadata and must include the `ID` column. All the following
columns are questions. A question is numeric (i.e. scored) when none of its cells
contain text. Free-text questions are listed but do not enter the charts.

The position of the first question and the name of the identifier column can be changed
in the configuration file (`firstQuestionColumnIndex`, `idColumn`).

## Scores

Answers are scored on the symmetric scale `-3, -2, -1, 1, 2, 3`. There is no neutral
answer. Forms usually export the raw scale `1..6`: a question column whose maximum is
above 3 or whose minimum is above 0 is shifted (`4, 5, 6` become `1, 2, 3` and
`1, 2, 3` become `-3, -2, -1`). The decision is made once per column.

Shifting is not idempotent: feeding an already shifted table that happens to contain only
positive values would shift it a second time. Always start from the raw export.

## Themes

Questions are grouped into themes. The default catalog contains the six themes of the
Culture & Moi questionnaire:

* Interdependency and objectives
* Agreed rules in the way of working
* Sense of belonging
* Bond the group
* Conflict resolution
* Safe environment

A question belongs to a theme when its text matches exactly one of the questions of the
theme. Another catalog may be provided in the configuration file:

```json
"themes": [
  { "name": "Sense of belonging", "questions": ["I do feel I belong to the team"] }
]
```

## Charts

All the charts are returned as JSON objects that a plotting library can draw without
further computation. The six scores always use the same colours, from dark red (`-3`) to
dark green (`3`).

* *Score distribution per question*: for each question of a theme, the number of
  respondents at each score. Labels are wrapped at 30 characters with `<br>`.
* *Score distribution per respondent*: the same over all the numeric questions, for each
  respondent. Respondents are ordered by median score, or by identifier. The respondents
  may be filtered; the `All` label disables the filter.
* *Top and bottom questions*: the three questions with the highest and the lowest average
  scores.
* *Treemap*: the average score of each respondent, arranged by department and team.

## Organisation

The treemap assigns the respondents, sorted by identifier, to the teams of the organisation
in order. The default organisation is the one of the pilot survey (13 respondents):

| department                  | team                | respondents |
|-----------------------------|---------------------|-------------|
| Department of Mental health | Team Culture & Moi  | 5           |
| Department of Informatics   | Team Agilopathes    | 3           |
| Department of Informatics   | Team Collaboration  | 5           |

The number of respondents must match the organisation exactly, otherwise the dashboard
fails with an error instead of drawing a misleading treemap.

*/
