//! Minimal HL7v2 message model.
//!
//! Messages are held as segments of raw field text. Components, repetitions
//! and subcomponents are split on demand, so a parsed message re-encodes to
//! the bytes it came from. Field numbers are one-based as in the HL7
//! standard; for `MSH`, field 1 is the field separator itself and field 2
//! holds the encoding characters.

mod escape;

use std::fmt;

use crate::error::ParseError;

/// Segment terminator written between segments.
pub const SEGMENT_TERMINATOR: char = '\r';

/// Identifier of the message header segment.
pub const HEADER_SEGMENT: &str = "MSH";

const MESSAGE_TYPE_FIELD: usize = 9;
const CONTROL_ID_FIELD: usize = 10;

/// Delimiters declared by MSH-1 and MSH-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    /// Field separator, `|` by convention.
    pub field: char,
    /// Component separator, `^` by convention.
    pub component: char,
    /// Repetition separator, `~` by convention.
    pub repetition: char,
    /// Escape character, `\` by convention.
    pub escape: char,
    /// Subcomponent separator, `&` by convention.
    pub subcomponent: char,
}

impl Delimiters {
    /// The delimiters recommended by the standard, `|^~\&`.
    pub const STANDARD: Self = Self {
        field: '|',
        component: '^',
        repetition: '~',
        escape: '\\',
        subcomponent: '&',
    };

    fn from_header(field: char, encoding: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidEncodingCharacters {
            characters: encoding.to_owned(),
        };
        let characters: Vec<char> = encoding.chars().collect();
        let [component, repetition, escape, subcomponent, ..] = characters.as_slice() else {
            return Err(invalid());
        };
        if characters.len() > 5 {
            return Err(invalid());
        }
        let delimiters = Self {
            field,
            component: *component,
            repetition: *repetition,
            escape: *escape,
            subcomponent: *subcomponent,
        };
        let declared = delimiters.as_array();
        let distinct = declared
            .iter()
            .enumerate()
            .all(|(index, character)| !declared.iter().skip(index + 1).any(|c| c == character));
        let printable = declared
            .iter()
            .all(|character| !character.is_alphanumeric() && !character.is_whitespace());
        if distinct && printable {
            Ok(delimiters)
        } else {
            Err(invalid())
        }
    }

    const fn as_array(&self) -> [char; 5] {
        [
            self.field,
            self.component,
            self.repetition,
            self.escape,
            self.subcomponent,
        ]
    }

    /// MSH-2 text for these delimiters.
    #[must_use]
    pub fn encoding_characters(&self) -> String {
        [self.component, self.repetition, self.escape, self.subcomponent]
            .iter()
            .collect()
    }

    /// Joins raw components with the component separator, dropping trailing
    /// empty components.
    #[must_use]
    pub fn join_components<I, S>(&self, components: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        join_trimmed(components, self.component)
    }

    /// Joins raw subcomponents with the subcomponent separator, dropping
    /// trailing empty subcomponents.
    #[must_use]
    pub fn join_subcomponents<I, S>(&self, subcomponents: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        join_trimmed(subcomponents, self.subcomponent)
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::STANDARD
    }
}

fn join_trimmed<I, S>(parts: I, separator: char) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut joined = String::new();
    let mut pending = 0usize;
    let mut first = true;
    for part in parts {
        let text = part.as_ref();
        if text.is_empty() {
            pending += 1;
            continue;
        }
        if !first {
            pending += 1;
        }
        for _ in 0..pending {
            joined.push(separator);
        }
        pending = 0;
        first = false;
        joined.push_str(text);
    }
    joined
}

/// One segment: a three-character identifier followed by raw field text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    id: String,
    fields: Vec<String>,
    delimiters: Delimiters,
}

impl Segment {
    /// Creates an empty segment. A `MSH` segment is seeded with MSH-1 and
    /// MSH-2 from `delimiters`.
    #[must_use]
    pub fn new(id: impl Into<String>, delimiters: Delimiters) -> Self {
        let segment_id: String = id.into();
        let fields = if segment_id == HEADER_SEGMENT {
            vec![
                delimiters.field.to_string(),
                delimiters.encoding_characters(),
            ]
        } else {
            Vec::new()
        };
        Self {
            id: segment_id,
            fields,
            delimiters,
        }
    }

    fn parse(line: &str, delimiters: Delimiters, position: usize) -> Result<Self, ParseError> {
        let mut parts = line.split(delimiters.field);
        let id = parts.next().unwrap_or_default();
        if !is_segment_id(id) {
            return Err(ParseError::InvalidSegmentId {
                id: id.to_owned(),
                position,
            });
        }
        Ok(Self {
            id: id.to_owned(),
            fields: parts.map(str::to_owned).collect(),
            delimiters,
        })
    }

    /// Segment identifier such as `PID`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Delimiters used to encode this segment.
    #[must_use]
    pub const fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Number of fields present, ignoring the identifier.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Raw text of field `number`, or `""` when absent.
    #[must_use]
    pub fn field(&self, number: usize) -> &str {
        number
            .checked_sub(1)
            .and_then(|index| self.fields.get(index))
            .map_or("", String::as_str)
    }

    /// Raw repetitions of field `number`. An absent field yields one empty
    /// repetition.
    pub fn repetitions(&self, number: usize) -> impl Iterator<Item = &str> {
        self.field(number).split(self.delimiters.repetition)
    }

    /// Raw text of component `component` in the first repetition of field
    /// `number`.
    #[must_use]
    pub fn component(&self, number: usize, component: usize) -> &str {
        let first = self.repetitions(number).next().unwrap_or_default();
        component
            .checked_sub(1)
            .and_then(|index| first.split(self.delimiters.component).nth(index))
            .unwrap_or_default()
    }

    /// Unescaped text of component `component` in the first repetition of
    /// field `number`.
    #[must_use]
    pub fn value(&self, number: usize, component: usize) -> String {
        self.delimiters.unescape(self.component(number, component))
    }

    /// Replaces field `number` with raw text, padding with empty fields.
    ///
    /// Field numbers below 1, and MSH-1/MSH-2, are left untouched.
    pub fn set_field(&mut self, number: usize, raw: impl Into<String>) {
        let protected = if self.id == HEADER_SEGMENT { 2 } else { 0 };
        if number == 0 || number <= protected {
            return;
        }
        if self.fields.len() < number {
            self.fields.resize(number, String::new());
        }
        if let Some(slot) = self.fields.get_mut(number - 1) {
            *slot = raw.into();
        }
    }

    /// Escapes `text` and stores it as field `number`.
    pub fn set_value(&mut self, number: usize, text: &str) {
        let escaped = self.delimiters.escape(text);
        self.set_field(number, escaped);
    }

    /// Builder form of [`Segment::set_field`].
    #[must_use]
    pub fn with_field(mut self, number: usize, raw: impl Into<String>) -> Self {
        self.set_field(number, raw);
        self
    }

    /// Builder form of [`Segment::set_value`].
    #[must_use]
    pub fn with_value(mut self, number: usize, text: &str) -> Self {
        self.set_value(number, text);
        self
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.id)?;
        let separator = self.delimiters.field;
        let skip = usize::from(self.id == HEADER_SEGMENT);
        for field in self.fields.iter().skip(skip) {
            write!(formatter, "{separator}{field}")?;
        }
        Ok(())
    }
}

fn is_segment_id(id: &str) -> bool {
    let mut characters = id.chars();
    let leading = characters.next().is_some_and(|c| c.is_ascii_uppercase());
    leading
        && id.chars().count() == 3
        && characters.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Message type from MSH-9, components joined with `^`
/// (for example `QBP^Q22^QBP_Q21`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageType(String);

impl MessageType {
    /// Wraps a message type written in `^`-joined form.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_owned())
    }

    fn from_field(raw: &str, delimiters: &Delimiters) -> Self {
        let first = raw.split(delimiters.repetition).next().unwrap_or_default();
        let components = first.split(delimiters.component).map(str::trim);
        Self(join_trimmed(components, '^'))
    }

    /// The message type as a registry key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether MSH-9 was blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Message code, the first component (for example `QBP`).
    #[must_use]
    pub fn code(&self) -> &str {
        self.part(0)
    }

    /// Trigger event, the second component (for example `Q22`).
    #[must_use]
    pub fn trigger_event(&self) -> &str {
        self.part(1)
    }

    /// Message structure, the third component (for example `QBP_Q21`).
    #[must_use]
    pub fn structure(&self) -> &str {
        self.part(2)
    }

    fn part(&self, index: usize) -> &str {
        self.0.split('^').nth(index).unwrap_or_default()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for MessageType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for MessageType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A parsed or assembled HL7v2 message. The header is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Segment,
    body: Vec<Segment>,
}

impl Message {
    /// Parses the text of one frame.
    ///
    /// Segments may be terminated by `\r`, `\n` or `\r\n`; blank lines are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the text is empty, does not start with
    /// a usable `MSH` segment, contains a malformed segment identifier, or
    /// lacks a message type (MSH-9) or control ID (MSH-10).
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut lines = text
            .split(['\r', '\n'])
            .filter(|line| !line.trim().is_empty());
        let first = lines.next().ok_or(ParseError::Empty)?;
        let header = parse_header(first.trim_start())?;
        let delimiters = header.delimiters;
        let body = lines
            .enumerate()
            .map(|(index, line)| Segment::parse(line, delimiters, index + 2))
            .collect::<Result<Vec<_>, _>>()?;
        let message = Self { header, body };
        if message.message_type().is_empty() {
            return Err(ParseError::MissingField {
                segment: HEADER_SEGMENT,
                field: MESSAGE_TYPE_FIELD,
            });
        }
        if message.control_id().is_empty() {
            return Err(ParseError::MissingField {
                segment: HEADER_SEGMENT,
                field: CONTROL_ID_FIELD,
            });
        }
        Ok(message)
    }

    /// Starts a message from its header segment.
    #[must_use]
    pub const fn new(header: Segment) -> Self {
        Self {
            header,
            body: Vec::new(),
        }
    }

    /// Appends a segment after the existing ones.
    pub fn push(&mut self, segment: Segment) {
        self.body.push(segment);
    }

    /// Delimiters declared by the header.
    #[must_use]
    pub const fn delimiters(&self) -> &Delimiters {
        &self.header.delimiters
    }

    /// The `MSH` segment.
    #[must_use]
    pub const fn header(&self) -> &Segment {
        &self.header
    }

    /// All segments in order, header first.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        std::iter::once(&self.header).chain(self.body.iter())
    }

    /// First segment with identifier `id`.
    #[must_use]
    pub fn segment(&self, id: &str) -> Option<&Segment> {
        self.segments().find(|segment| segment.id == id)
    }

    /// Message type from MSH-9.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        MessageType::from_field(self.header.field(MESSAGE_TYPE_FIELD), &self.header.delimiters)
    }

    /// Message control ID from MSH-10.
    #[must_use]
    pub fn control_id(&self) -> &str {
        self.header.component(CONTROL_ID_FIELD, 1).trim()
    }

    /// Sending application from MSH-3, first component.
    #[must_use]
    pub fn sending_application(&self) -> &str {
        self.header.component(3, 1)
    }

    /// Sending facility from MSH-4, first component.
    #[must_use]
    pub fn sending_facility(&self) -> &str {
        self.header.component(4, 1)
    }

    /// Encodes the message with every segment followed by `\r`.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        for segment in self.segments() {
            encoded.push_str(&segment.to_string());
            encoded.push(SEGMENT_TERMINATOR);
        }
        encoded
    }
}

fn parse_header(line: &str) -> Result<Segment, ParseError> {
    let mut characters = line.chars();
    let id: String = characters.by_ref().take(3).collect();
    if id != HEADER_SEGMENT {
        return Err(ParseError::MissingHeader { found: id });
    }
    let field = characters.next().ok_or(ParseError::TruncatedHeader)?;
    let mut parts = characters.as_str().split(field);
    let encoding = parts.next().unwrap_or_default();
    if encoding.is_empty() {
        return Err(ParseError::TruncatedHeader);
    }
    let delimiters = Delimiters::from_header(field, encoding)?;
    let mut fields = vec![field.to_string(), encoding.to_owned()];
    fields.extend(parts.map(str::to_owned));
    Ok(Segment {
        id,
        fields,
        delimiters,
    })
}

/// Best-effort read of MSH-10 from text that failed to parse.
///
/// Used to echo the control ID in a reject ACK when the rest of the message
/// is unusable.
#[must_use]
pub fn recover_control_id(text: &str) -> Option<String> {
    let line = text
        .split(['\r', '\n'])
        .map(str::trim_start)
        .find(|line| line.starts_with(HEADER_SEGMENT))?;
    let field = line.chars().nth(3)?;
    line.split(field)
        .nth(CONTROL_ID_FIELD - 1)
        .map(|raw| raw.split('^').next().unwrap_or_default().trim())
        .filter(|control_id| !control_id.is_empty())
        .map(str::to_owned)
}
