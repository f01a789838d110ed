//! Predicate evaluation for the in-memory provider.
//!
//! Condition operations form an expression with the usual precedence:
//!
//! ```text
//! expr   := term (OR term)*
//! term   := factor (AND? factor)*      adjacent conditions are ANDed
//! factor := BEGIN_WRAP expr END_WRAP | condition
//! ```
//!
//! Ordering, paging and `DISTINCT` are applied after filtering. `GROUP BY`
//! and `INDEXED BY` do not change the result of an in-memory scan and are
//! accepted as no-ops.

use std::cmp::Ordering;

use datashare_common::protocol::{
    DataShareError, OperationItem, OperationType, PredicateObject, Predicates, Result, SettingMode, ValueObject,
    ValuesBucket,
};

#[derive(Debug, Clone)]
enum Expr {
    All,
    Condition(OperationItem),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
struct SortKey {
    field: String,
    descending: bool,
}

/// A compiled [`Predicates`].
#[derive(Debug, Clone)]
pub struct Selection {
    filter: Expr,
    order: Vec<SortKey>,
    limit: Option<usize>,
    offset: usize,
    distinct: bool,
}

impl Selection {
    /// Compiles predicates, rejecting raw where clauses and malformed
    /// operation sequences.
    pub fn compile(predicates: &Predicates) -> Result<Self> {
        if predicates.setting_mode() == SettingMode::QueryLanguage {
            return Err(DataShareError::Parameter("where clauses are not supported".into()));
        }

        let mut conditions = Vec::new();
        let mut selection = Selection { filter: Expr::All, order: Vec::new(), limit: None, offset: 0, distinct: false };

        for item in predicates.operations() {
            match item.operation() {
                OperationType::OrderByAsc | OperationType::OrderByDesc => {
                    selection.order.push(SortKey {
                        field: field(item)?.to_string(),
                        descending: item.operation() == OperationType::OrderByDesc,
                    });
                }
                OperationType::Limit => {
                    let number = int_param(item, 0)?;
                    selection.limit = usize::try_from(number).ok();
                    if let Some(offset) = item.params().get(1) {
                        selection.offset = non_negative(offset)?;
                    }
                }
                OperationType::Offset => selection.offset = non_negative(param(item, 0)?)?,
                OperationType::Distinct => selection.distinct = true,
                OperationType::GroupBy | OperationType::IndexedBy => {}
                OperationType::KeyPrefix | OperationType::InKeys => {
                    return Err(DataShareError::Parameter(format!(
                        "{:?} applies to key-value stores only",
                        item.operation()
                    )));
                }
                _ => conditions.push(item.clone()),
            }
        }

        selection.order.extend(parse_order(predicates.order()));

        if !conditions.is_empty() {
            let mut parser = Parser { items: &conditions, pos: 0 };
            selection.filter = parser.expr()?;
            if parser.pos != conditions.len() {
                return Err(DataShareError::Parameter("unbalanced END_WRAP in predicates".into()));
            }
        }
        Ok(selection)
    }

    pub fn matches(&self, row: &ValuesBucket) -> bool {
        eval(&self.filter, row)
    }

    /// Sorts matching rows in place. Nulls sort first; the first key wins.
    pub fn sort<T>(&self, rows: &mut [T], bucket: impl Fn(&T) -> &ValuesBucket) {
        if self.order.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            let (a, b) = (bucket(a), bucket(b));
            for key in &self.order {
                let ordering = sort_order(a.get(&key.field), b.get(&key.field));
                let ordering = if key.descending { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    /// Applies `DISTINCT`, offset and limit to projected rows.
    pub fn page(&self, mut rows: Vec<Vec<ValueObject>>) -> Vec<Vec<ValueObject>> {
        if self.distinct {
            let mut seen: Vec<Vec<ValueObject>> = Vec::with_capacity(rows.len());
            rows.retain(|row| {
                if seen.contains(row) {
                    false
                } else {
                    seen.push(row.clone());
                    true
                }
            });
        }
        let rows = rows.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        }
    }
}

// ---- Parsing ----

struct Parser<'a> {
    items: &'a [OperationItem],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<OperationType> {
        self.items.get(self.pos).map(OperationItem::operation)
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        while self.peek() == Some(OperationType::Or) {
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        loop {
            match self.peek() {
                Some(OperationType::And) => self.pos += 1,
                Some(OperationType::Or) | Some(OperationType::EndWrap) | None => return Ok(left),
                Some(_) => {}
            }
            let right = self.factor()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
    }

    fn factor(&mut self) -> Result<Expr> {
        let item = self
            .items
            .get(self.pos)
            .ok_or_else(|| DataShareError::Parameter("predicates end with a connective".into()))?;
        self.pos += 1;
        match item.operation() {
            OperationType::BeginWrap => {
                let inner = self.expr()?;
                if self.peek() != Some(OperationType::EndWrap) {
                    return Err(DataShareError::Parameter("BEGIN_WRAP without END_WRAP".into()));
                }
                self.pos += 1;
                Ok(inner)
            }
            OperationType::And | OperationType::Or | OperationType::EndWrap => {
                Err(DataShareError::Parameter(format!("unexpected {:?} in predicates", item.operation())))
            }
            _ => {
                check_condition(item)?;
                Ok(Expr::Condition(item.clone()))
            }
        }
    }
}

fn check_condition(item: &OperationItem) -> Result<()> {
    let needed = match item.operation() {
        OperationType::IsNull | OperationType::IsNotNull => 1,
        OperationType::Between | OperationType::NotBetween => 3,
        _ => 2,
    };
    field(item)?;
    if item.params().len() < needed {
        return Err(DataShareError::Parameter(format!(
            "{:?} needs {} parameters, got {}",
            item.operation(),
            needed,
            item.params().len()
        )));
    }
    Ok(())
}

fn field(item: &OperationItem) -> Result<&str> {
    item.field()
        .ok_or_else(|| DataShareError::Parameter(format!("{:?} needs a field name", item.operation())))
}

fn param(item: &OperationItem, index: usize) -> Result<&PredicateObject> {
    item.params()
        .get(index)
        .ok_or_else(|| DataShareError::Parameter(format!("{:?} is missing parameter {}", item.operation(), index + 1)))
}

fn int_param(item: &OperationItem, index: usize) -> Result<i64> {
    match param(item, index)? {
        PredicateObject::Int64(v) => Ok(*v),
        other => Err(DataShareError::Parameter(format!("expected an integer, got {:?}", other))),
    }
}

fn non_negative(value: &PredicateObject) -> Result<usize> {
    match value {
        PredicateObject::Int64(v) if *v >= 0 => Ok(*v as usize),
        other => Err(DataShareError::Parameter(format!("expected a non-negative integer, got {:?}", other))),
    }
}

/// Parses a raw `ORDER BY` list such as `"age DESC, name"`.
fn parse_order(order: &str) -> Vec<SortKey> {
    order
        .split(',')
        .filter_map(|part| {
            let mut words = part.split_whitespace();
            let field = words.next()?.to_string();
            let descending = words.next().is_some_and(|dir| dir.eq_ignore_ascii_case("desc"));
            Some(SortKey { field, descending })
        })
        .collect()
}

// ---- Evaluation ----

fn eval(expr: &Expr, row: &ValuesBucket) -> bool {
    match expr {
        Expr::All => true,
        Expr::And(a, b) => eval(a, row) && eval(b, row),
        Expr::Or(a, b) => eval(a, row) || eval(b, row),
        Expr::Condition(item) => condition(item, row),
    }
}

fn condition(item: &OperationItem, row: &ValuesBucket) -> bool {
    let params = item.params();
    let value = item.field().and_then(|f| row.get(f)).unwrap_or(&ValueObject::Null);
    let operand = |i: usize| params.get(i).and_then(PredicateObject::as_value);

    match item.operation() {
        OperationType::IsNull => value.is_null(),
        OperationType::IsNotNull => !value.is_null(),
        OperationType::EqualTo => compare(value, operand(1)) == Some(Ordering::Equal),
        OperationType::NotEqualTo => matches!(compare(value, operand(1)), Some(o) if o != Ordering::Equal),
        OperationType::GreaterThan => compare(value, operand(1)) == Some(Ordering::Greater),
        OperationType::LessThan => compare(value, operand(1)) == Some(Ordering::Less),
        OperationType::GreaterThanOrEqualTo => {
            matches!(compare(value, operand(1)), Some(Ordering::Greater | Ordering::Equal))
        }
        OperationType::LessThanOrEqualTo => matches!(compare(value, operand(1)), Some(Ordering::Less | Ordering::Equal)),
        OperationType::Between => between(value, operand(1), operand(2)),
        OperationType::NotBetween => !value.is_null() && !between(value, operand(1), operand(2)),
        OperationType::In => params.get(1).is_some_and(|set| contains(set, value)),
        OperationType::NotIn => !value.is_null() && params.get(1).is_some_and(|set| !contains(set, value)),
        OperationType::Like => text_match(value, operand(1), like),
        OperationType::Unlike => matches!(value, ValueObject::String(_)) && !text_match(value, operand(1), like),
        OperationType::Glob => text_match(value, operand(1), glob),
        OperationType::Contains => text_match(value, operand(1), |s, needle| s.contains(needle)),
        _ => true,
    }
}

/// Orders two non-null values of comparable types. Integers and doubles
/// compare numerically with each other.
fn compare(a: &ValueObject, b: Option<ValueObject>) -> Option<Ordering> {
    let b = b?;
    match (a, &b) {
        (ValueObject::Int64(x), ValueObject::Int64(y)) => Some(x.cmp(y)),
        (ValueObject::Int64(x), ValueObject::Double(y)) => (*x as f64).partial_cmp(y),
        (ValueObject::Double(x), ValueObject::Int64(y)) => x.partial_cmp(&(*y as f64)),
        (ValueObject::Double(x), ValueObject::Double(y)) => x.partial_cmp(y),
        (ValueObject::String(x), ValueObject::String(y)) => Some(x.cmp(y)),
        (ValueObject::Bool(x), ValueObject::Bool(y)) => Some(x.cmp(y)),
        (ValueObject::Blob(x), ValueObject::Blob(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn sort_order(a: Option<&ValueObject>, b: Option<&ValueObject>) -> Ordering {
    let a = a.unwrap_or(&ValueObject::Null);
    let b = b.unwrap_or(&ValueObject::Null);
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare(a, Some(b.clone())).unwrap_or(Ordering::Equal),
    }
}

fn between(value: &ValueObject, low: Option<ValueObject>, high: Option<ValueObject>) -> bool {
    matches!(compare(value, low), Some(Ordering::Greater | Ordering::Equal))
        && matches!(compare(value, high), Some(Ordering::Less | Ordering::Equal))
}

fn contains(set: &PredicateObject, value: &ValueObject) -> bool {
    let is = |candidate: ValueObject| compare(value, Some(candidate)) == Some(Ordering::Equal);
    match set {
        PredicateObject::IntVector(v) => v.iter().any(|x| is(ValueObject::Int64(i64::from(*x)))),
        PredicateObject::Int64Vector(v) => v.iter().any(|x| is(ValueObject::Int64(*x))),
        PredicateObject::DoubleVector(v) => v.iter().any(|x| is(ValueObject::Double(*x))),
        PredicateObject::StringVector(v) => v.iter().any(|x| is(ValueObject::String(x.clone()))),
        scalar => scalar.as_value().is_some_and(is),
    }
}

fn text_match(value: &ValueObject, pattern: Option<ValueObject>, matcher: impl Fn(&str, &str) -> bool) -> bool {
    match (value, pattern) {
        (ValueObject::String(s), Some(ValueObject::String(p))) => matcher(s, &p),
        _ => false,
    }
}

/// SQL `LIKE`: `%` matches any run, `_` one character, ASCII case-insensitive.
fn like(text: &str, pattern: &str) -> bool {
    wildcard(text, pattern, '%', '_', |a, b| a.eq_ignore_ascii_case(&b))
}

/// `GLOB`: `*` matches any run, `?` one character, case-sensitive.
fn glob(text: &str, pattern: &str) -> bool {
    wildcard(text, pattern, '*', '?', |a, b| a == b)
}

fn wildcard(text: &str, pattern: &str, any: char, one: char, eq: impl Fn(char, char) -> bool) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == any {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == one || eq(pattern[p], text[t])) {
            p += 1;
            t += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == any)
}
