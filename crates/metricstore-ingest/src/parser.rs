//! Parsing for the line-protocol-like wire format the ingestor accepts:
//! `measurement,tag1=v1,tag2=v2 field1=v1[,field2=v2...] timestamp`.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("line does not have the expected measurement/fields/timestamp sections")]
    Malformed,
    #[error("malformed tag or field {0:?}, expected key=value")]
    BadKeyValue(String),
    #[error("field {0:?} is not a valid float")]
    BadFieldValue(String),
    #[error("timestamp {0:?} is not a valid integer")]
    BadTimestamp(String),
}

/// One parsed line: a measurement name, its tags in line order, one or
/// more fields, and a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, f32)>,
    pub timestamp: i64,
}

pub fn parse_line(line: &str) -> Result<ParsedLine, ParseError> {
    let line = line.trim();
    let mut sections = line.splitn(3, ' ');
    let measurement_and_tags = sections.next().ok_or(ParseError::Malformed)?;
    let fields_section = sections.next().ok_or(ParseError::Malformed)?;
    let ts_section = sections.next().ok_or(ParseError::Malformed)?;

    let mut mt_parts = measurement_and_tags.split(',');
    let measurement = mt_parts.next().ok_or(ParseError::Malformed)?.to_owned();
    let mut tags = Vec::new();
    for part in mt_parts {
        let (k, v) = part
            .split_once('=')
            .ok_or_else(|| ParseError::BadKeyValue(part.to_owned()))?;
        tags.push((k.to_owned(), v.to_owned()));
    }

    let mut fields = Vec::new();
    for part in fields_section.split(',') {
        let (k, v) = part
            .split_once('=')
            .ok_or_else(|| ParseError::BadKeyValue(part.to_owned()))?;
        let value: f32 = v
            .parse()
            .map_err(|_| ParseError::BadFieldValue(part.to_owned()))?;
        fields.push((k.to_owned(), value));
    }

    let timestamp: i64 = ts_section
        .parse()
        .map_err(|_| ParseError::BadTimestamp(ts_section.to_owned()))?;

    Ok(ParsedLine {
        measurement,
        tags,
        fields,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_line() {
        let line = "power,cluster=fritz,host=n1337 flops=1.5,watts=200 1000";
        let parsed = parse_line(line).unwrap();
        assert_eq!(parsed.measurement, "power");
        assert_eq!(
            parsed.tags,
            vec![
                ("cluster".to_owned(), "fritz".to_owned()),
                ("host".to_owned(), "n1337".to_owned())
            ]
        );
        assert_eq!(
            parsed.fields,
            vec![("flops".to_owned(), 1.5), ("watts".to_owned(), 200.0)]
        );
        assert_eq!(parsed.timestamp, 1000);
    }

    #[test]
    fn rejects_missing_timestamp() {
        assert_eq!(parse_line("power flops=1.0"), Err(ParseError::Malformed));
    }

    #[test]
    fn rejects_non_numeric_field() {
        let err = parse_line("power flops=abc 1000").unwrap_err();
        assert!(matches!(err, ParseError::BadFieldValue(_)));
    }
}
