// Operator argument grammar
//
//   raw      := '"'? token* '"'?
//   token    := '-P' key '=' value
//   value    := scalar | '[' record (';' record)* ']' | '[]'
//   record   := element '[' field (',' field)* ']'
//   field    := name '=' text

use crate::domain::error::{DomainError, Result};

/// One record of a structured argument, fields in declaration order
pub type Record = Vec<(String, String)>;

/// Composite argument value such as `variables` or `conditions`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuredList {
    /// Name of the repeated element (`variable`, `condition`, ...)
    pub element: String,
    pub records: Vec<Record>,
}

impl StructuredList {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            records: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Scalar(String),
    List(StructuredList),
}

impl ArgValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ArgValue::Scalar(s) => Some(s),
            ArgValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&StructuredList> {
        match self {
            ArgValue::List(list) => Some(list),
            ArgValue::Scalar(_) => None,
        }
    }

    /// Text form accepted back by [`parse_arguments`]
    pub fn to_argument_text(&self) -> String {
        match self {
            ArgValue::Scalar(s) => s.clone(),
            ArgValue::List(list) => {
                let records: Vec<String> = list
                    .records
                    .iter()
                    .map(|record| {
                        let fields: Vec<String> =
                            record.iter().map(|(k, v)| format!("{k}={v}")).collect();
                        format!("{}[{}]", list.element, fields.join(","))
                    })
                    .collect();
                format!("[{}]", records.join(";"))
            }
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Scalar(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Scalar(value)
    }
}

impl From<StructuredList> for ArgValue {
    fn from(value: StructuredList) -> Self {
        ArgValue::List(value)
    }
}

/// A `name`/`expression` pair carried by variable and condition records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedExpression {
    pub name: String,
    pub expression: String,
}

impl NamedExpression {
    pub(crate) fn from_record(record: &Record) -> Option<Self> {
        let field = |key: &str| {
            record
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        Some(Self {
            name: field("name")?,
            expression: field("expression").unwrap_or_default(),
        })
    }

    pub(crate) fn to_record(&self) -> Record {
        vec![
            ("name".to_string(), self.name.clone()),
            ("expression".to_string(), self.expression.clone()),
        ]
    }
}

/// Insert or replace `key`, keeping the original position on replace.
pub(crate) fn upsert(arguments: &mut Vec<(String, ArgValue)>, key: &str, value: ArgValue) {
    match arguments.iter_mut().find(|(k, _)| k == key) {
        Some((_, slot)) => *slot = value,
        None => arguments.push((key.to_string(), value)),
    }
}

/// Parse a raw `-Pkey=value` argument string into ordered arguments.
///
/// Only the literal `-P` marker separates tokens, so values may contain spaces. Single quotes
/// become double quotes, which keeps embedded CRS definitions intact on the way to the markup.
pub fn parse_arguments(raw: &str) -> Result<Vec<(String, ArgValue)>> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('"').unwrap_or(raw);
    let raw = raw.strip_suffix('"').unwrap_or(raw);
    let normalized = raw.replace('\'', "\"");

    let mut arguments = Vec::new();
    for token in normalized.split("-P") {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| DomainError::InvalidArgument(format!("expected key=value in '{token}'")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(DomainError::InvalidArgument(format!("empty key in '{token}'")));
        }
        let value = value.trim();
        let value = if value.starts_with('[') {
            ArgValue::List(parse_structured(value)?)
        } else {
            ArgValue::Scalar(value.to_string())
        };
        upsert(&mut arguments, key, value);
    }
    Ok(arguments)
}

/// Parse `[element[f=v,...];element[f=v,...]]`. `[]` is an empty list.
pub fn parse_structured(value: &str) -> Result<StructuredList> {
    let inner = value
        .trim()
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| DomainError::InvalidArgument(format!("unbalanced list value '{value}'")))?;

    let mut list = StructuredList::default();
    for chunk in inner.split(';') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let (element, body) = chunk
            .split_once('[')
            .ok_or_else(|| DomainError::InvalidArgument(format!("missing '[' in record '{chunk}'")))?;
        let body = body
            .strip_suffix(']')
            .ok_or_else(|| DomainError::InvalidArgument(format!("missing ']' in record '{chunk}'")))?;
        let element = element.trim();
        if list.element.is_empty() {
            list.element = element.to_string();
        }

        let mut record = Record::new();
        for field in body.split(',') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let (name, text) = field.split_once('=').ok_or_else(|| {
                DomainError::InvalidArgument(format!("expected field=value in '{field}'"))
            })?;
            record.push((name.trim().to_string(), text.trim().to_string()));
        }
        list.records.push(record);
    }
    Ok(list)
}

/// Render arguments back to the `-Pkey=value` form
pub fn format_arguments(arguments: &[(String, ArgValue)]) -> String {
    arguments
        .iter()
        .map(|(k, v)| format!("-P{k}={}", v.to_argument_text()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(s: &str) -> ArgValue {
        ArgValue::Scalar(s.to_string())
    }

    #[test]
    fn test_parse_scalar_arguments() {
        let args = parse_arguments("-PnirFactor=1.0 -PsourceBand=B8").unwrap();
        assert_eq!(
            args,
            vec![
                ("nirFactor".to_string(), scalar("1.0")),
                ("sourceBand".to_string(), scalar("B8")),
            ]
        );
    }

    #[test]
    fn test_parse_strips_outer_quotes_once() {
        let args = parse_arguments("\"-PtargetResolution=60 -Pname=a b\"").unwrap();
        assert_eq!(args[0].1, scalar("60"));
        assert_eq!(args[1].1, scalar("a b"));
    }

    #[test]
    fn test_single_quotes_become_double_quotes() {
        let args = parse_arguments("-Pcrs=GEOGCS['WGS84',DATUM['WGS_1984']]").unwrap();
        assert_eq!(args[0].1, scalar("GEOGCS[\"WGS84\",DATUM[\"WGS_1984\"]]"));
    }

    #[test]
    fn test_parse_structured_list() {
        let args = parse_arguments(
            "-Pvariables=[variable[name=ndvi,expression=ndvi];variable[name=flags,expression=flags]]",
        )
        .unwrap();
        let list = args[0].1.as_list().unwrap();
        assert_eq!(list.element, "variable");
        assert_eq!(list.records.len(), 2);
        assert_eq!(
            list.records[0],
            vec![
                ("name".to_string(), "ndvi".to_string()),
                ("expression".to_string(), "ndvi".to_string()),
            ]
        );
        assert_eq!(list.records[1][0].1, "flags");
    }

    #[test]
    fn test_empty_structured_list() {
        let args = parse_arguments("-Pconditions=[]").unwrap();
        assert!(args[0].1.as_list().unwrap().is_empty());
    }

    #[test]
    fn test_token_without_equals_is_rejected() {
        let err = parse_arguments("-PnirFactor").unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[test]
    fn test_repeated_key_keeps_last_value() {
        let args = parse_arguments("-Pa=1 -Pb=2 -Pa=3").unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], ("a".to_string(), scalar("3")));
    }

    #[test]
    fn test_format_arguments_reparses() {
        let raw = "-Pfactor=2 -Pvariables=[variable[name=a,expression=b*2]]";
        let args = parse_arguments(raw).unwrap();
        assert_eq!(format_arguments(&args), raw);
    }
}
