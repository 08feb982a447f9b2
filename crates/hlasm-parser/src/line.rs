//! Fixed-format source lines.
//!
//! HLASM source format:
//! - **Column 1**: statement start (`*` or `.*` = comment)
//! - **Column 72**: continuation character (non-blank = continued)
//! - **Column 16**: continuation lines resume here
//! - **Columns 73-80**: sequence numbers (ignored)
//!
//! The `ICTL` directive can move the begin, end and continue columns; the
//! rest of the pipeline works on [`LogicalLine`]s with the columns already
//! resolved.

/// Begin/end/continue columns, 1-based as written in ICTL operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IctlColumns {
    /// First column of the statement field (default 1).
    pub begin: usize,
    /// Last column of the statement field (default 71).
    pub end: usize,
    /// First column of continuation-line content (default 16).
    /// `None` disables continuations entirely.
    pub continuation: Option<usize>,
}

impl Default for IctlColumns {
    fn default() -> Self {
        Self {
            begin: 1,
            end: 71,
            continuation: Some(16),
        }
    }
}

impl IctlColumns {
    /// Validate ICTL operand values: begin 1-40, end 41-80, end > begin + 5,
    /// continue between begin + 1 and 40.
    pub fn validate(begin: usize, end: usize, continuation: Option<usize>) -> Option<Self> {
        if !(1..=40).contains(&begin) || !(41..=80).contains(&end) || end < begin + 5 {
            return None;
        }
        if let Some(c) = continuation {
            if c <= begin || c > 40 {
                return None;
            }
        }
        Some(Self {
            begin,
            end,
            continuation,
        })
    }
}

/// One physical line's contribution to a logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSegment {
    /// Zero-based line number within the document.
    pub lineno: usize,
    /// The code content (between the begin/continue column and the end
    /// column, continuation character excluded).
    pub code: String,
    /// Column (0-based, UTF-16 units) at which `code` starts on the line.
    pub code_start: u32,
    /// Column one past the end of `code`.
    pub code_end: u32,
    /// Whether this segment carried a continuation character.
    pub continued: bool,
}

/// A statement's worth of source: one line plus its continuations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogicalLine {
    pub segments: Vec<LineSegment>,
}

impl LogicalLine {
    /// Concatenated code of all segments.
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.code.as_str()).collect()
    }

    /// Zero-based number of the first physical line.
    pub fn first_line(&self) -> usize {
        self.segments.first().map_or(0, |s| s.lineno)
    }

    /// Number of physical lines consumed.
    pub fn line_count(&self) -> usize {
        self.segments.len()
    }

    /// Full-line comments start with `*` or `.*`.
    pub fn is_comment(&self) -> bool {
        let text = match self.segments.first() {
            Some(s) => s.code.as_str(),
            None => return false,
        };
        text.starts_with('*') || text.starts_with(".*")
    }

    /// Whether the logical line has any non-blank content.
    pub fn is_blank(&self) -> bool {
        self.segments.iter().all(|s| s.code.trim().is_empty())
    }
}

/// Extract one logical line starting at `lines[start]`, merging
/// continuations. Returns the logical line and the number of physical lines
/// consumed (at least 1 when input remains).
pub fn extract_logical_line(lines: &[&str], start: usize, cols: &IctlColumns) -> Option<(LogicalLine, usize)> {
    if start >= lines.len() {
        return None;
    }

    let mut logical = LogicalLine::default();
    let mut idx = start;
    let mut first = true;

    loop {
        let raw = lines.get(idx).copied().unwrap_or("");
        let chars: Vec<char> = raw.chars().collect();

        let begin0 = if first {
            cols.begin - 1
        } else {
            cols.continuation.map_or(cols.begin - 1, |c| c - 1)
        };
        let end0 = cols.end; // exclusive, 0-based

        // Continuation indicator sits one past the end column.
        let continued = cols.continuation.is_some()
            && chars.get(end0).is_some_and(|c| !c.is_whitespace());

        let code_slice: String = chars
            .iter()
            .skip(begin0)
            .take(end0.saturating_sub(begin0))
            .collect();
        let code = code_slice.trim_end().to_string();
        let code_len: u32 = code.chars().map(|c| c.len_utf16() as u32).sum();

        logical.segments.push(LineSegment {
            lineno: idx,
            code,
            code_start: begin0 as u32,
            code_end: begin0 as u32 + code_len,
            continued,
        });

        idx += 1;
        first = false;
        if !continued || idx >= lines.len() {
            break;
        }
    }

    Some((logical, idx - start))
}
