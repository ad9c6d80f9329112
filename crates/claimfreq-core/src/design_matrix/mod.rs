// =============================================================================
// Design Matrix Construction
// =============================================================================
//
// Turns a `Dataset` and a parsed formula into the numeric matrix X.
//
// CATEGORICAL ENCODING
// --------------------
// Levels are sorted (numerically when a numeric column is wrapped in C()),
// the first level is the reference and gets no column, and every other
// level becomes an indicator column named `var[T.level]`:
//
//     region = [East, North, East, West]
//
//              region[T.North]  region[T.West]
//     East           0               0
//     North          1               0
//     East           0               0
//     West           0               1
//
// When the formula removes the intercept (`0 +` or `- 1`), the first factor
// main effect keeps every level instead (`region[East]`, `region[North]`,
// ...), the way R and patsy code it. Later factors stay reference-coded.
//
// INTERACTIONS
// ------------
// An interaction block is the row-wise product of every column of one
// factor's block with every column of the other's. For two categoricals this
// gives one indicator per pair of non-reference levels; a pair that never
// occurs in the data is an all-zero column, which the solver reports as
// aliased.
//
// NEW DATA
// --------
// `DesignSpec` remembers the levels it learned from the training data so a
// hold-out set is encoded into exactly the same columns. A level the model
// never saw is an error rather than a silent all-reference row.
//
// =============================================================================

use std::collections::{HashMap, HashSet};

use ndarray::{Array1, Array2, Axis};

use crate::error::{ClaimFreqError, Result};
use crate::formula::{OffsetTerm, ParsedFormula};

// =============================================================================
// Tabular data
// =============================================================================

/// One named column of a `Dataset`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Array1<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Column::Categorical(v) => Column::Categorical(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// Column-oriented table of equal-length named columns.
///
/// Rows are policies (or policy-periods); the crate never reads files, so a
/// loader fills this from whatever source it has.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<(String, Column)>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, checking its length against the existing ones.
    pub fn push(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.columns.iter().any(|(n, _)| *n == name) {
            return Err(ClaimFreqError::InvalidInput(format!("duplicate column '{}'", name)));
        }
        if let Some(n) = self.n_rows() {
            if column.len() != n {
                return Err(ClaimFreqError::DimensionMismatch(format!(
                    "column '{}' has {} rows, dataset has {}",
                    name,
                    column.len(),
                    n
                )));
            }
        }
        self.columns.push((name, column));
        Ok(())
    }

    pub fn with_numeric(mut self, name: impl Into<String>, values: Array1<f64>) -> Result<Self> {
        self.push(name, Column::Numeric(values))?;
        Ok(self)
    }

    pub fn with_categorical<S: AsRef<str>>(mut self, name: impl Into<String>, values: &[S]) -> Result<Self> {
        let values = values.iter().map(|s| s.as_ref().to_string()).collect();
        self.push(name, Column::Categorical(values))?;
        Ok(self)
    }

    /// Number of rows, `None` before the first column is added.
    pub fn n_rows(&self) -> Option<usize> {
        self.columns.first().map(|(_, c)| c.len())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| ClaimFreqError::Formula(format!("unknown column '{}'", name)))
    }

    pub fn numeric(&self, name: &str) -> Result<&Array1<f64>> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(v),
            Column::Categorical(_) => Err(ClaimFreqError::Formula(format!(
                "column '{}' is categorical, expected numeric",
                name
            ))),
        }
    }

    /// New dataset holding only `rows`, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Dataset> {
        let n = self.n_rows().unwrap_or(0);
        if let Some(&bad) = rows.iter().find(|&&i| i >= n) {
            return Err(ClaimFreqError::InvalidInput(format!(
                "row index {} out of range for {} rows",
                bad, n
            )));
        }
        Ok(Dataset {
            columns: self
                .columns
                .iter()
                .map(|(name, col)| (name.clone(), col.select(rows)))
                .collect(),
        })
    }
}

// =============================================================================
// Categorical encoding
// =============================================================================

/// Indicator columns for one categorical variable.
#[derive(Debug, Clone)]
pub struct CategoricalEncoding {
    pub matrix: Array2<f64>,
    pub names: Vec<String>,
    /// Level index of each observation.
    pub indices: Vec<usize>,
    pub levels: Vec<String>,
}

/// Sorted unique levels and the level index of each value.
pub fn factorize_strings<S: AsRef<str>>(values: &[S]) -> (Vec<String>, Vec<u32>) {
    let mut levels: Vec<String> = values
        .iter()
        .map(|v| v.as_ref())
        .collect::<HashSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect();
    levels.sort();

    let lookup: HashMap<&str, u32> = levels.iter().enumerate().map(|(i, l)| (l.as_str(), i as u32)).collect();
    let codes = values.iter().map(|v| lookup[v.as_ref()]).collect();
    (levels, codes)
}

/// Indicator matrix from precomputed level indices.
///
/// With `drop_first`, level 0 is the reference and has no column and the
/// rest are named `var[T.level]`; without it every level gets a column
/// named `var[level]`.
pub fn encode_categorical_from_indices(
    indices: &[usize],
    level_names: &[String],
    var_name: &str,
    drop_first: bool,
) -> CategoricalEncoding {
    let skip = usize::from(drop_first);
    let n_cols = level_names.len().saturating_sub(skip);
    let mut matrix = Array2::zeros((indices.len(), n_cols));
    for (i, &level) in indices.iter().enumerate() {
        if level >= skip {
            matrix[[i, level - skip]] = 1.0;
        }
    }
    let names = level_names
        .iter()
        .skip(skip)
        .map(|l| {
            if drop_first {
                format!("{}[T.{}]", var_name, l)
            } else {
                format!("{}[{}]", var_name, l)
            }
        })
        .collect();

    CategoricalEncoding {
        matrix,
        names,
        indices: indices.to_vec(),
        levels: level_names.to_vec(),
    }
}

/// Factorize `values` and encode them as indicator columns.
pub fn encode_categorical<S: AsRef<str>>(values: &[S], var_name: &str, drop_first: bool) -> CategoricalEncoding {
    let (levels, codes) = factorize_strings(values);
    let indices: Vec<usize> = codes.into_iter().map(|c| c as usize).collect();
    encode_categorical_from_indices(&indices, &levels, var_name, drop_first)
}

/// Label used for a numeric value treated as a factor level: `2` not `2.0`.
fn numeric_level_label(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Level labels of a column read as a factor.
fn factor_labels(name: &str, column: &Column) -> Result<Vec<String>> {
    match column {
        Column::Categorical(v) => Ok(v.clone()),
        Column::Numeric(v) => {
            if v.iter().any(|x| !x.is_finite()) {
                return Err(ClaimFreqError::InvalidInput(format!(
                    "categorical column '{}' contains non-finite values",
                    name
                )));
            }
            Ok(v.iter().map(|&x| numeric_level_label(x)).collect())
        }
    }
}

/// Levels of a factor in model order: numeric order for numeric columns,
/// lexical order for string columns.
fn learn_levels(name: &str, column: &Column) -> Result<Vec<String>> {
    match column {
        Column::Categorical(v) => Ok(factorize_strings(v).0),
        Column::Numeric(v) => {
            factor_labels(name, column)?;
            let mut values: Vec<f64> = v.to_vec();
            values.sort_by(|a, b| a.total_cmp(b));
            values.dedup();
            Ok(values.into_iter().map(numeric_level_label).collect())
        }
    }
}

// =============================================================================
// Column blocks and interactions
// =============================================================================

/// A set of named design columns produced by one factor or term.
#[derive(Debug, Clone)]
struct Block {
    matrix: Array2<f64>,
    names: Vec<String>,
}

/// Row-wise product of every column of `left` with every column of `right`.
///
/// Column order runs `right` fastest, names are joined with ':'.
fn interact(left: &Block, right: &Block) -> Block {
    let n = left.matrix.nrows();
    let (p, q) = (left.matrix.ncols(), right.matrix.ncols());
    let mut matrix = Array2::zeros((n, p * q));
    let mut names = Vec::with_capacity(p * q);
    for a in 0..p {
        for b in 0..q {
            let col = &left.matrix.column(a) * &right.matrix.column(b);
            matrix.column_mut(a * q + b).assign(&col);
            names.push(format!("{}:{}", left.names[a], right.names[b]));
        }
    }
    Block { matrix, names }
}

// =============================================================================
// Design specification
// =============================================================================

/// Numeric design matrix with its column names.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub matrix: Array2<f64>,
    pub column_names: Vec<String>,
}

/// A formula bound to the factor levels seen in the training data.
#[derive(Debug, Clone)]
pub struct DesignSpec {
    formula: ParsedFormula,
    /// Learned levels for every variable treated as a factor.
    levels: HashMap<String, Vec<String>>,
    column_names: Vec<String>,
}

impl DesignSpec {
    /// Resolve each variable's kind and learn factor levels from `data`.
    ///
    /// A variable is a factor when it is wrapped in `C()` or its column holds
    /// strings.
    pub fn from_formula(formula: &ParsedFormula, data: &Dataset) -> Result<Self> {
        let mut levels = HashMap::new();
        for var in formula.variables() {
            let column = data.column(&var)?;
            let is_factor = formula.categorical_vars.contains(&var) || matches!(column, Column::Categorical(_));
            if is_factor {
                let learned = learn_levels(&var, column)?;
                if learned.len() < 2 {
                    log::warn!("factor '{}' has a single level and contributes no columns", var);
                }
                levels.insert(var, learned);
            }
        }

        let mut spec = Self {
            formula: formula.clone(),
            levels,
            column_names: Vec::new(),
        };
        spec.column_names = spec.build(data)?.column_names;
        Ok(spec)
    }

    pub fn formula(&self) -> &ParsedFormula {
        &self.formula
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Learned levels of factor `var`, reference level first.
    pub fn levels(&self, var: &str) -> Option<&[String]> {
        self.levels.get(var).map(Vec::as_slice)
    }

    fn factor_block(&self, var: &str, data: &Dataset, drop_first: bool) -> Result<Block> {
        let column = data.column(var)?;
        match self.levels.get(var) {
            Some(levels) => {
                let lookup: HashMap<&str, usize> =
                    levels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
                let indices = factor_labels(var, column)?
                    .iter()
                    .map(|label| {
                        lookup.get(label.as_str()).copied().ok_or_else(|| {
                            ClaimFreqError::InvalidInput(format!(
                                "level '{}' of '{}' was not seen when the model was fitted",
                                label, var
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let enc = encode_categorical_from_indices(&indices, levels, var, drop_first);
                Ok(Block { matrix: enc.matrix, names: enc.names })
            }
            None => {
                let values = data.numeric(var)?;
                if values.iter().any(|x| !x.is_finite()) {
                    return Err(ClaimFreqError::InvalidInput(format!(
                        "numeric column '{}' contains non-finite values",
                        var
                    )));
                }
                Ok(Block {
                    matrix: values.clone().insert_axis(Axis(1)),
                    names: vec![var.to_string()],
                })
            }
        }
    }

    /// Encode `data` into the design matrix, using the training levels.
    pub fn build(&self, data: &Dataset) -> Result<DesignMatrix> {
        let n = data
            .n_rows()
            .ok_or_else(|| ClaimFreqError::EmptyInput("dataset has no columns".to_string()))?;

        let mut blocks = Vec::new();
        if self.formula.has_intercept {
            blocks.push(Block {
                matrix: Array2::ones((n, 1)),
                names: vec!["(Intercept)".to_string()],
            });
        }

        // Without an intercept the first factor main effect keeps every
        // level, so its levels absorb the baseline the intercept would carry.
        let full_rank_term = if self.formula.has_intercept {
            None
        } else {
            self.formula
                .terms
                .iter()
                .position(|t| !t.is_interaction() && self.levels.contains_key(&t.factors[0]))
        };

        for (t, term) in self.formula.terms.iter().enumerate() {
            let mut block = self.factor_block(&term.factors[0], data, full_rank_term != Some(t))?;
            for factor in &term.factors[1..] {
                block = interact(&block, &self.factor_block(factor, data, true)?);
            }
            blocks.push(block);
        }

        let views: Vec<_> = blocks.iter().map(|b| b.matrix.view()).collect();
        let matrix = if views.is_empty() {
            Array2::zeros((n, 0))
        } else {
            ndarray::concatenate(Axis(1), &views)
                .map_err(|e| ClaimFreqError::DimensionMismatch(e.to_string()))?
        };
        let column_names: Vec<String> = blocks.into_iter().flat_map(|b| b.names).collect();

        if !self.column_names.is_empty() && column_names != self.column_names {
            return Err(ClaimFreqError::DimensionMismatch(format!(
                "new data encodes to {} columns, model has {}",
                column_names.len(),
                self.column_names.len()
            )));
        }

        log::debug!("design matrix: {} rows x {} columns", n, matrix.ncols());
        Ok(DesignMatrix { matrix, column_names })
    }

    /// Response column as counts.
    pub fn response(&self, data: &Dataset) -> Result<Array1<f64>> {
        Ok(data.numeric(&self.formula.response)?.clone())
    }

    /// Offset column, logged when the formula says `offset(log(var))`.
    pub fn offset(&self, data: &Dataset) -> Result<Option<Array1<f64>>> {
        match &self.formula.offset {
            None => Ok(None),
            Some(term) => offset_values(term, data).map(Some),
        }
    }
}

fn offset_values(term: &OffsetTerm, data: &Dataset) -> Result<Array1<f64>> {
    let raw = data.numeric(&term.variable)?;
    if !term.log {
        return Ok(raw.clone());
    }
    if let Some(bad) = raw.iter().find(|&&e| !(e > 0.0) || !e.is_finite()) {
        return Err(ClaimFreqError::InvalidInput(format!(
            "log offset needs positive '{}', found {}",
            term.variable, bad
        )));
    }
    Ok(raw.mapv(f64::ln))
}
