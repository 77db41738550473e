//! STEP reader: statement splitting and instance parsing.

use super::{StepError, StepHeader, TextEncoding};
use crate::graph::{Entity, EntityGraph, EntityId, Value};
use crate::schema::TypeTag;
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Longest statement excerpt quoted in error messages
const PREVIEW_LEN: usize = 80;

/// Read and parse a STEP file into an entity graph
pub fn read_model(path: &Path) -> Result<EntityGraph, StepError> {
    let bytes = fs::read(path).map_err(|source| StepError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());

    let (text, encoding) = TextEncoding::decode(&bytes);
    if encoding != TextEncoding::Utf8 {
        debug!("{} is not valid UTF-8, reading as {:?}", path.display(), encoding);
    }
    let (header, entities) = parse_document(&text)?;
    let graph = EntityGraph::from_entities(header.with_encoding(encoding), entities)?;

    info!(
        "Loaded {} entities ({} edges, schema {}) from {}",
        graph.len(),
        graph.edge_count(),
        graph.schema(),
        path.display()
    );
    if graph.unresolved_count() > 0 {
        debug!(
            "{} attribute references point outside the model",
            graph.unresolved_count()
        );
    }
    Ok(graph)
}

/// Parse STEP text into an entity graph
pub fn parse_str(text: &str) -> Result<EntityGraph, StepError> {
    let (header, entities) = parse_document(text)?;
    Ok(EntityGraph::from_entities(header, entities)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Header,
    Data,
}

fn parse_document(text: &str) -> Result<(StepHeader, Vec<Entity>), StepError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut statements = Statements::new(text);

    match statements.next() {
        Some(Ok((_, first))) if first == "ISO-10303-21" => {}
        Some(Err(e)) => return Err(e),
        _ => return Err(StepError::MissingSignature),
    }

    let mut section = Section::Outside;
    let mut header = Vec::new();
    let mut entities = Vec::new();
    let mut saw_data = false;

    for statement in statements {
        let (line, text) = statement?;
        let text = text.as_ref();
        match (section, text) {
            (_, "ENDSEC") => section = Section::Outside,
            (_, "END-ISO-10303-21") => break,
            (Section::Outside, "HEADER") => section = Section::Header,
            (Section::Outside, t) if is_data_keyword(t) => {
                section = Section::Data;
                saw_data = true;
            }
            (Section::Header, t) => header.push(t.to_string()),
            (Section::Data, t) => entities.push(parse_instance(t, line)?),
            (Section::Outside, t) => {
                return Err(StepError::Malformed {
                    line,
                    message: format!("unexpected statement outside a section: {}", preview(t)),
                })
            }
        }
    }

    if !saw_data {
        return Err(StepError::MissingData);
    }
    Ok((StepHeader::from_statements(header), entities))
}

fn is_data_keyword(statement: &str) -> bool {
    statement == "DATA"
        || statement
            .strip_prefix("DATA")
            .is_some_and(|rest| rest.trim_start().starts_with('('))
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_LEN) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

// ============================================================================
// Statement Splitting
// ============================================================================

/// Splits STEP text into `;`-terminated statements, skipping comments and
/// honoring string literals. Yields the starting line of each statement.
struct Statements<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Statements<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
        }
    }

    /// Skip a `/* … */` comment starting at `self.pos`
    fn skip_comment(&mut self) -> Result<(), StepError> {
        let start_line = self.line;
        let body_start = self.pos + 2;
        match self.src[body_start..].find("*/") {
            Some(offset) => {
                let end = body_start + offset;
                self.line += self.src[self.pos..end].matches('\n').count();
                self.pos = end + 2;
                Ok(())
            }
            None => Err(StepError::Malformed {
                line: start_line,
                message: "unterminated comment".to_string(),
            }),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), StepError> {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b if b.is_ascii_whitespace() => self.pos += 1,
                b'/' if bytes.get(self.pos + 1) == Some(&b'*') => self.skip_comment()?,
                _ => break,
            }
        }
        Ok(())
    }
}

impl<'a> Iterator for Statements<'a> {
    type Item = Result<(usize, Cow<'a, str>), StepError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.skip_trivia() {
            self.pos = self.src.len();
            return Some(Err(e));
        }
        let bytes = self.src.as_bytes();
        if self.pos >= bytes.len() {
            return None;
        }

        let start_line = self.line;
        let start = self.pos;
        let mut segment_start = start;
        let mut stitched: Option<String> = None;
        let mut in_string = false;

        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            if in_string {
                match b {
                    b'\'' if bytes.get(self.pos + 1) == Some(&b'\'') => {
                        self.pos += 2;
                        continue;
                    }
                    b'\'' => in_string = false,
                    b'\n' => self.line += 1,
                    _ => {}
                }
                self.pos += 1;
                continue;
            }

            match b {
                b'\'' => in_string = true,
                b'\n' => self.line += 1,
                b'/' if bytes.get(self.pos + 1) == Some(&b'*') => {
                    stitched
                        .get_or_insert_with(String::new)
                        .push_str(&self.src[segment_start..self.pos]);
                    if let Err(e) = self.skip_comment() {
                        self.pos = self.src.len();
                        return Some(Err(e));
                    }
                    segment_start = self.pos;
                    continue;
                }
                b';' => {
                    let text = match stitched.take() {
                        Some(mut buf) => {
                            buf.push_str(&self.src[segment_start..self.pos]);
                            Cow::Owned(buf.trim().to_string())
                        }
                        None => Cow::Borrowed(self.src[start..self.pos].trim()),
                    };
                    self.pos += 1;
                    return Some(Ok((start_line, text)));
                }
                _ => {}
            }
            self.pos += 1;
        }

        Some(Err(StepError::Malformed {
            line: start_line,
            message: if in_string {
                "unterminated string literal".to_string()
            } else {
                "statement is missing its terminating ';'".to_string()
            },
        }))
    }
}

// ============================================================================
// Instance Parsing
// ============================================================================

fn parse_instance(text: &str, line: usize) -> Result<Entity, StepError> {
    let malformed = |message: &str| StepError::Malformed {
        line,
        message: format!("{}: {}", message, preview(text)),
    };

    let rest = text
        .strip_prefix('#')
        .ok_or_else(|| malformed("expected an instance name"))?;
    let (id_text, body) = rest
        .split_once('=')
        .ok_or_else(|| malformed("expected '=' after the instance name"))?;
    let id: u64 = id_text
        .trim()
        .parse()
        .map_err(|_| malformed("invalid instance id"))?;

    let body = body.trim_start();
    if body.starts_with('(') {
        return Err(StepError::ComplexInstance { line, id });
    }

    let open = body
        .find('(')
        .ok_or_else(|| malformed("expected an attribute list"))?;
    let keyword = body[..open].trim();
    if keyword.is_empty()
        || !keyword
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return Err(malformed("invalid type keyword"));
    }

    let mut cursor = Cursor::new(&body[open..]);
    let attributes = cursor.parse_list().map_err(|m| malformed(&m))?;
    cursor.skip_ws();
    if !cursor.at_end() {
        return Err(malformed("trailing characters after the attribute list"));
    }

    Ok(Entity {
        id: EntityId(id),
        type_tag: TypeTag::new(keyword),
        attributes,
    })
}

/// Recursive-descent reader over one attribute list.
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: u8) -> Result<(), String> {
        match self.peek() {
            Some(b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(format!(
                "expected '{}' but found '{}'",
                expected as char, b as char
            )),
            None => Err(format!("expected '{}' but reached the end", expected as char)),
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    fn parse_list(&mut self) -> Result<Vec<Value>, String> {
        self.expect(b'(')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(items);
        }

        loop {
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(b) => return Err(format!("unexpected '{}' in list", b as char)),
                None => return Err("unterminated list".to_string()),
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value, String> {
        self.skip_ws();
        match self.peek() {
            None => Err("unexpected end of attribute list".to_string()),
            Some(b'$') => {
                self.pos += 1;
                Ok(Value::Null)
            }
            Some(b'*') => {
                self.pos += 1;
                Ok(Value::Derived)
            }
            Some(b'#') => {
                self.pos += 1;
                let digits = self.take_while(|b| b.is_ascii_digit());
                digits
                    .parse()
                    .map(|id| Value::Ref(EntityId(id)))
                    .map_err(|_| format!("invalid reference '#{}'", digits))
            }
            Some(b'\'') => self.parse_string().map(Value::String),
            Some(b'"') => {
                self.pos += 1;
                let digits = self.take_while(|b| b != b'"');
                let digits = digits.to_string();
                self.expect(b'"')?;
                Ok(Value::Binary(digits))
            }
            Some(b'.') => {
                self.pos += 1;
                let literal = self
                    .take_while(|b| b.is_ascii_alphanumeric() || b == b'_')
                    .to_string();
                self.expect(b'.')?;
                Ok(Value::Enum(literal))
            }
            Some(b'(') => self.parse_list().map(Value::List),
            Some(b) if b == b'-' || b == b'+' || b.is_ascii_digit() => self.parse_number(),
            Some(b) if b.is_ascii_alphabetic() => {
                let tag = self.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                self.skip_ws();
                self.expect(b'(')?;
                let value = self.parse_value()?;
                self.skip_ws();
                self.expect(b')')?;
                Ok(Value::Typed {
                    tag: TypeTag::new(tag),
                    value: Box::new(value),
                })
            }
            Some(b) => Err(format!("unexpected character '{}'", b as char)),
        }
    }

    /// Parse a `'…'` literal, collapsing `''` into `'`
    fn parse_string(&mut self) -> Result<String, String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(offset) = self.src[self.pos..].find('\'') else {
                return Err("unterminated string literal".to_string());
            };
            out.push_str(&self.src[self.pos..self.pos + offset]);
            self.pos += offset + 1;
            if self.peek() == Some(b'\'') {
                out.push('\'');
                self.pos += 1;
            } else {
                return Ok(out);
            }
        }
    }

    fn parse_number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        self.take_while(|b| b.is_ascii_digit());

        let mut real = false;
        if self.peek() == Some(b'.') {
            real = true;
            self.pos += 1;
            self.take_while(|b| b.is_ascii_digit());
        }
        if matches!(self.peek(), Some(b'E' | b'e')) {
            real = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'-' | b'+')) {
                self.pos += 1;
            }
            self.take_while(|b| b.is_ascii_digit());
        }

        let text = &self.src[start..self.pos];
        if real {
            text.parse()
                .map(Value::Real)
                .map_err(|_| format!("invalid real '{}'", text))
        } else {
            text.parse()
                .map(Value::Integer)
                .map_err(|_| format!("invalid integer '{}'", text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_NAME('model.ifc','2024-01-01T00:00:00',('a'),('b'),'x','y','');
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
/* project */
#1=IFCPROJECT('0YvctVUKr0kugbFTf53O9L',$,'It''s a project',$,$,$,$,(#2),#3);
#2=IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.E-05,#4,$);
#3=IFCUNITASSIGNMENT(());
#4=IFCAXIS2PLACEMENT3D(#5,$,$);
#5=IFCCARTESIANPOINT((0.,-1.5,2.));
#6=IFCPROPERTYSINGLEVALUE('IsExternal',$,IFCBOOLEAN(.T.),$);
#7=IFCPIXELTEXTURE($,$,$,$,$,1,1,1,(\"0FF\"));
ENDSEC;
END-ISO-10303-21;
";

    #[test]
    fn test_parse_minimal_document() {
        let graph = parse_str(MINIMAL).unwrap();
        assert_eq!(graph.len(), 7);
        assert_eq!(graph.schema(), "IFC4");
        assert_eq!(graph.header().statements().len(), 3);

        let project = graph.get(EntityId(1)).unwrap();
        assert_eq!(project.type_tag.as_str(), "IFCPROJECT");
        assert_eq!(project.name().as_deref(), Some("It's a project"));
        assert_eq!(project.attributes[7], Value::List(vec![Value::Ref(EntityId(2))]));
    }

    #[test]
    fn test_parse_parameter_forms() {
        let graph = parse_str(MINIMAL).unwrap();

        let context = graph.get(EntityId(2)).unwrap();
        assert_eq!(context.attributes[2], Value::Integer(3));
        assert_eq!(context.attributes[3], Value::Real(1.0e-5));

        let point = graph.get(EntityId(5)).unwrap();
        assert_eq!(
            point.attributes[0],
            Value::List(vec![Value::Real(0.0), Value::Real(-1.5), Value::Real(2.0)])
        );

        let property = graph.get(EntityId(6)).unwrap();
        assert_eq!(
            property.attributes[2],
            Value::Typed {
                tag: TypeTag::new("IFCBOOLEAN"),
                value: Box::new(Value::Enum("T".to_string())),
            }
        );

        let texture = graph.get(EntityId(7)).unwrap();
        assert_eq!(
            texture.attributes[8],
            Value::List(vec![Value::Binary("0FF".to_string())])
        );
        assert_eq!(graph.get(EntityId(3)).unwrap().attributes[0], Value::List(vec![]));
    }

    #[test]
    fn test_semicolon_inside_string_and_comment() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;
#1=IFCWALL('a;b',/* c; */$,'x');
ENDSEC;END-ISO-10303-21;";
        let graph = parse_str(text).unwrap();
        let wall = graph.get(EntityId(1)).unwrap();
        assert_eq!(wall.attributes[0], Value::String("a;b".to_string()));
        assert_eq!(wall.attributes[1], Value::Null);
        assert_eq!(wall.attributes.len(), 3);
    }

    #[test]
    fn test_missing_signature() {
        let err = parse_str("HEADER;ENDSEC;DATA;ENDSEC;").unwrap_err();
        assert!(matches!(err, StepError::MissingSignature));
    }

    #[test]
    fn test_missing_data_section() {
        let err = parse_str("ISO-10303-21;HEADER;ENDSEC;END-ISO-10303-21;").unwrap_err();
        assert!(matches!(err, StepError::MissingData));
    }

    #[test]
    fn test_malformed_instance_reports_line() {
        let text = "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1=IFCWALL('a',$;\nENDSEC;\n";
        let err = parse_str(text).unwrap_err();
        match err {
            StepError::Malformed { line, .. } => assert_eq!(line, 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_instance_is_fatal() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#1=IFCWALL($);#1=IFCBEAM($);ENDSEC;";
        let err = parse_str(text).unwrap_err();
        assert!(matches!(err, StepError::Graph(_)));
    }

    #[test]
    fn test_complex_instance_rejected() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;#9=(IFCA() IFCB());ENDSEC;";
        let err = parse_str(text).unwrap_err();
        assert!(matches!(err, StepError::ComplexInstance { id: 9, .. }));
    }

    #[test]
    fn test_unterminated_comment() {
        let text = "ISO-10303-21;HEADER;ENDSEC;DATA;/* never closed";
        assert!(matches!(
            parse_str(text).unwrap_err(),
            StepError::Malformed { .. }
        ));
    }

    #[test]
    fn test_read_model_missing_file() {
        let err = read_model(Path::new("/nonexistent/model.ifc")).unwrap_err();
        assert!(matches!(err, StepError::Io { .. }));
    }
}
