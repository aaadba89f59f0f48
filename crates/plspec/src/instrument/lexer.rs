//! Line-oriented PL/SQL lexer deciding which lines start a statement.
//!
//! The lexer strips comments, string literals (including `q'[...]'`) and
//! quoted identifiers, tracks a stack of block frames, and records for each
//! physical line the byte offset of the first statement that starts on it.
//! Those offsets are where the tracker call is injected.
//!
//! Conditional compilation is read as directives: the condition between
//! `$IF`/`$ELSIF` and `$THEN`, and the text of `$ERROR ... $END`, are skipped.
//! Statements inside either branch are classified as usual.

/// Block frame on the structure stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    /// Declarative section (package spec, `IS ... BEGIN`, `DECLARE ... BEGIN`)
    Declare,
    /// Executable section (`BEGIN ... END`)
    Body,
    /// `CASE` statement
    CaseStmt,
    /// `CASE` expression inside a statement or declaration
    CaseExpr,
}

/// Where a line stands inside a multi-line construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    BlockComment,
    /// String literal; `Some(c)` for `q'c...c'` with closing delimiter `c`
    Str(Option<char>),
    QuotedIdent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Word(String),
    Semi,
    LParen,
    RParen,
    Label,
    /// `$IF`, `$THEN`, `$ELSE`, ... with the `$` stripped
    Directive(String),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: Kind,
    offset: usize,
}

/// Result of classifying one object's source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Per physical line: injection offset when the line is executable
    pub points: Vec<Option<usize>>,
    /// Structural problem found while scanning, if any
    pub structure_error: Option<String>,
}

impl Classification {
    /// Number of executable lines
    #[must_use]
    pub fn executable_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }
}

/// Classify every physical line of a source
///
/// `lines` are physical lines with or without their terminators.
#[must_use]
pub fn classify(lines: &[&str]) -> Classification {
    let mut scanner = Scanner::default();
    let mut structure = Structure::new(lines.len());

    for (index, line) in lines.iter().enumerate() {
        let content = crate::object::line_content(line);
        for token in scanner.scan_line(content) {
            structure.on_token(&token, index);
        }
    }
    structure.finish();

    let structure_error = if scanner.mode != Mode::Code {
        Some(match scanner.mode {
            Mode::BlockComment => "unterminated comment".to_string(),
            Mode::QuotedIdent => "unterminated quoted identifier".to_string(),
            _ => "unterminated string literal".to_string(),
        })
    } else {
        structure.error()
    };

    Classification {
        points: structure.points,
        structure_error,
    }
}

/// Check that a source would compile structurally: balanced blocks and no
/// unterminated literal or comment
pub fn check_structure(lines: &[&str]) -> Result<(), String> {
    match classify(lines).structure_error {
        Some(message) => Err(message),
        None => Ok(()),
    }
}

#[derive(Debug)]
struct Scanner {
    mode: Mode,
}

impl Default for Scanner {
    fn default() -> Self {
        Self { mode: Mode::Code }
    }
}

const fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '#')
}

const fn q_quote_close(open: char) -> char {
    match open {
        '[' => ']',
        '(' => ')',
        '{' => '}',
        '<' => '>',
        other => other,
    }
}

impl Scanner {
    /// Tokenize one line, carrying comment/string state to the next line
    fn scan_line(&mut self, line: &str) -> Vec<Token> {
        let chars: Vec<(usize, char)> = line.char_indices().collect();
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let (offset, c) = chars[i];
            let next = chars.get(i + 1).map(|&(_, n)| n);

            match self.mode {
                Mode::BlockComment => {
                    if c == '*' && next == Some('/') {
                        self.mode = Mode::Code;
                        i += 2;
                    } else {
                        i += 1;
                    }
                    continue;
                }
                Mode::Str(None) => {
                    if c == '\'' {
                        if next == Some('\'') {
                            i += 2;
                        } else {
                            self.mode = Mode::Code;
                            i += 1;
                        }
                    } else {
                        i += 1;
                    }
                    continue;
                }
                Mode::Str(Some(close)) => {
                    if c == close && next == Some('\'') {
                        self.mode = Mode::Code;
                        i += 2;
                    } else {
                        i += 1;
                    }
                    continue;
                }
                Mode::QuotedIdent => {
                    if c == '"' {
                        self.mode = Mode::Code;
                    }
                    i += 1;
                    continue;
                }
                Mode::Code => {}
            }

            if c.is_whitespace() {
                i += 1;
            } else if c == '-' && next == Some('-') {
                break;
            } else if c == '/' && next == Some('*') {
                self.mode = Mode::BlockComment;
                i += 2;
            } else if c == '\'' {
                tokens.push(Token {
                    kind: Kind::Other,
                    offset,
                });
                self.mode = Mode::Str(None);
                i += 1;
            } else if matches!(c, 'q' | 'Q' | 'n' | 'N') && next == Some('\'') {
                // N'..' national literal or q'x..x' alternative quoting
                tokens.push(Token {
                    kind: Kind::Other,
                    offset,
                });
                if matches!(c, 'q' | 'Q') {
                    match chars.get(i + 2) {
                        Some(&(_, open)) => {
                            self.mode = Mode::Str(Some(q_quote_close(open)));
                            i += 3;
                        }
                        None => {
                            self.mode = Mode::Str(None);
                            i += 2;
                        }
                    }
                } else {
                    self.mode = Mode::Str(None);
                    i += 2;
                }
            } else if c == '"' {
                // quoted identifiers behave like plain identifiers
                tokens.push(Token {
                    kind: Kind::Word(String::new()),
                    offset,
                });
                self.mode = Mode::QuotedIdent;
                i += 1;
            } else if c == '<' && next == Some('<') {
                tokens.push(Token {
                    kind: Kind::Label,
                    offset,
                });
                i += 2;
                while i < chars.len() {
                    if chars[i].1 == '>' && chars.get(i + 1).map(|&(_, n)| n) == Some('>') {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            } else if c == '$' {
                // $$NAME is an inquiry directive and reads as an operand
                let inquiry = next == Some('$');
                i += if inquiry { 2 } else { 1 };
                let start = i;
                while i < chars.len() && is_word_char(chars[i].1) {
                    i += 1;
                }
                let word_start = chars.get(start).map_or(line.len(), |&(o, _)| o);
                let end = chars.get(i).map_or(line.len(), |&(o, _)| o);
                let kind = if inquiry || word_start == end {
                    Kind::Other
                } else {
                    Kind::Directive(line[word_start..end].to_ascii_uppercase())
                };
                tokens.push(Token { kind, offset });
            } else if is_word_start(c) {
                let start = i;
                while i < chars.len() && is_word_char(chars[i].1) {
                    i += 1;
                }
                let end = chars.get(i).map_or(line.len(), |&(o, _)| o);
                tokens.push(Token {
                    kind: Kind::Word(line[offset..end].to_ascii_uppercase()),
                    offset: chars[start].0,
                });
            } else {
                let kind = match c {
                    ';' => Kind::Semi,
                    '(' => Kind::LParen,
                    ')' => Kind::RParen,
                    _ => Kind::Other,
                };
                tokens.push(Token { kind, offset });
                i += 1;
            }
        }

        tokens
    }
}

/// Statements whose own grammar uses THEN, ELSE or LOOP
fn is_sql_statement(word: &str) -> bool {
    matches!(word, "SELECT" | "INSERT" | "UPDATE" | "DELETE" | "MERGE" | "WITH")
}

#[derive(Debug)]
struct Structure {
    frames: Vec<Frame>,
    header_pending: bool,
    stmt_open: bool,
    /// The open statement is SQL; THEN/ELSE/LOOP belong to it until `;`
    sql_open: bool,
    /// Inside a directive condition or `$ERROR` text
    in_directive: bool,
    pending_end: bool,
    paren: u32,
    pending_label: Option<(usize, usize)>,
    underflow: bool,
    points: Vec<Option<usize>>,
}

impl Structure {
    fn new(line_count: usize) -> Self {
        Self {
            frames: Vec::new(),
            header_pending: false,
            stmt_open: false,
            sql_open: false,
            in_directive: false,
            pending_end: false,
            paren: 0,
            pending_label: None,
            underflow: false,
            points: vec![None; line_count],
        }
    }

    fn in_executable(&self) -> bool {
        matches!(self.frames.last(), Some(Frame::Body | Frame::CaseStmt))
    }

    fn pop(&mut self) {
        if self.frames.pop().is_none() {
            self.underflow = true;
        }
    }

    fn mark_start(&mut self, line: usize, offset: usize) {
        let (line, offset) = self.pending_label.take().unwrap_or((line, offset));
        if self.points[line].is_none() {
            self.points[line] = Some(offset);
        }
    }

    fn on_token(&mut self, token: &Token, line: usize) {
        if let Kind::Directive(directive) = &token.kind {
            self.on_directive(directive);
            return;
        }
        if self.in_directive {
            return;
        }

        if self.pending_end {
            self.pending_end = false;
            match &token.kind {
                Kind::Word(w) if w == "IF" || w == "LOOP" => return,
                Kind::Word(w) if w == "CASE" => {
                    self.pop();
                    return;
                }
                _ => self.pop(),
            }
        }

        match &token.kind {
            Kind::Word(word) => self.on_word(word, token.offset, line),
            Kind::Semi => {
                self.stmt_open = false;
                self.sql_open = false;
                self.header_pending = false;
                self.paren = 0;
            }
            Kind::LParen => {
                self.on_other(token.offset, line);
                self.paren += 1;
            }
            Kind::RParen => self.paren = self.paren.saturating_sub(1),
            Kind::Label => {
                if self.in_executable() && !self.stmt_open && self.pending_label.is_none() {
                    self.pending_label = Some((line, token.offset));
                }
            }
            Kind::Other => self.on_other(token.offset, line),
            Kind::Directive(_) => {}
        }
    }

    fn on_directive(&mut self, directive: &str) {
        match directive {
            "IF" | "ELSIF" | "ERROR" => self.in_directive = true,
            "THEN" | "END" => self.in_directive = false,
            _ => {}
        }
    }

    fn on_other(&mut self, offset: usize, line: usize) {
        if self.in_executable() && !self.stmt_open {
            self.mark_start(line, offset);
            self.stmt_open = true;
        }
    }

    fn on_word(&mut self, word: &str, offset: usize, line: usize) {
        match word {
            "END" => {
                self.stmt_open = true;
                self.pending_end = true;
                self.header_pending = false;
                return;
            }
            "BEGIN" => {
                self.header_pending = false;
                self.pending_label = None;
                if self.frames.last() == Some(&Frame::Declare) {
                    self.frames.pop();
                }
                self.frames.push(Frame::Body);
                self.stmt_open = false;
                self.sql_open = false;
                return;
            }
            "DECLARE" => {
                self.header_pending = false;
                self.pending_label = None;
                self.frames.push(Frame::Declare);
                self.stmt_open = false;
                self.sql_open = false;
                return;
            }
            "CASE" => {
                if self.in_executable() && !self.stmt_open {
                    self.mark_start(line, offset);
                    self.frames.push(Frame::CaseStmt);
                    self.stmt_open = true;
                } else {
                    self.frames.push(Frame::CaseExpr);
                }
                return;
            }
            _ => {}
        }

        if self.in_executable() {
            if self.stmt_open {
                if !self.sql_open && matches!(word, "THEN" | "LOOP" | "ELSE") {
                    self.stmt_open = false;
                }
            } else {
                match word {
                    "ELSIF" | "WHEN" => self.stmt_open = true,
                    "ELSE" | "EXCEPTION" | "THEN" => {}
                    "LOOP" => self.mark_start(line, offset),
                    _ => {
                        self.mark_start(line, offset);
                        self.stmt_open = true;
                        self.sql_open = is_sql_statement(word);
                    }
                }
            }
            return;
        }

        match word {
            "PROCEDURE" | "FUNCTION" | "PACKAGE" | "BODY" => {
                self.header_pending = true;
            }
            "IS" | "AS" if self.header_pending && self.paren == 0 => {
                self.header_pending = false;
                self.frames.push(Frame::Declare);
            }
            _ => {}
        }
    }

    fn finish(&mut self) {
        if self.pending_end {
            self.pending_end = false;
            self.pop();
        }
    }

    fn error(&self) -> Option<String> {
        if self.underflow {
            Some("END without matching block".to_string())
        } else if !self.frames.is_empty() {
            Some(format!("{} unclosed block(s)", self.frames.len()))
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn executable_lines(source: &str) -> Vec<usize> {
        let lines: Vec<&str> = source.split_inclusive('\n').collect();
        classify(&lines)
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|_| i + 1))
            .collect()
    }

    fn points(source: &str) -> Vec<Option<usize>> {
        let lines: Vec<&str> = source.split_inclusive('\n').collect();
        classify(&lines).points
    }

    const TEST_PROFILER: &str = "FUNCTION test_profiler RETURN VARCHAR2 IS
BEGIN
  RETURN 'test_profiler';
EXCEPTION
  WHEN OTHERS THEN
    RETURN 'others';
END;
";

    #[test]
    fn test_function_with_exception_handler() {
        assert_eq!(executable_lines(TEST_PROFILER), vec![3, 6]);
        assert_eq!(points(TEST_PROFILER)[2], Some(2));
        assert!(check_structure(&TEST_PROFILER.split_inclusive('\n').collect::<Vec<_>>()).is_ok());
    }

    #[test]
    fn test_declarations_are_not_executable() {
        let source = "PROCEDURE p(a IN NUMBER DEFAULT 1) IS
  v NUMBER := 0;
  CURSOR c IS SELECT 1 FROM dual;
  TYPE t_tab IS TABLE OF NUMBER;
BEGIN
  v := a;
END p;
";
        assert_eq!(executable_lines(source), vec![6]);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let source = "PROCEDURE p IS
BEGIN
  -- say hello
  /* block
     comment */
  dbms_output.put_line('x'); -- trailing
  /* lead */ NULL;

END;
";
        assert_eq!(executable_lines(source), vec![6, 7]);
        assert_eq!(points(source)[6], Some(13));
    }

    #[test]
    fn test_multi_line_statement_counts_once() {
        let source = "PROCEDURE p IS
BEGIN
  SELECT dummy
    INTO v
    FROM dual;
  UPDATE t
     SET x = 1;
END;
";
        assert_eq!(executable_lines(source), vec![3, 6]);
    }

    #[test]
    fn test_if_elsif_else() {
        let source = "PROCEDURE p(n NUMBER) IS
BEGIN
  IF n > 0
     AND n < 10 THEN
    x := 1;
  ELSIF n = 0 THEN
    x := 0;
  ELSE x := -1;
  END IF;
END;
";
        assert_eq!(executable_lines(source), vec![3, 5, 7, 8]);
        assert_eq!(points(source)[7], Some(7));
    }

    #[test]
    fn test_loops() {
        let source = "PROCEDURE p IS
BEGIN
  FOR i IN 1..10 LOOP
    NULL;
  END LOOP;
  LOOP
    EXIT WHEN done;
  END LOOP;
END;
";
        assert_eq!(executable_lines(source), vec![3, 4, 6, 7]);
    }

    #[test]
    fn test_case_statement_and_expression() {
        let source = "PROCEDURE p(n NUMBER) IS
  v VARCHAR2(10) := CASE WHEN n > 0 THEN 'pos' ELSE 'neg' END;
BEGIN
  CASE n
    WHEN 1 THEN
      x := CASE WHEN n > 0 THEN 1
                ELSE 2 END;
    ELSE
      NULL;
  END CASE;
END;
";
        assert_eq!(executable_lines(source), vec![4, 6, 9]);
        assert!(check_structure(&source.split_inclusive('\n').collect::<Vec<_>>()).is_ok());
    }

    #[test]
    fn test_package_spec_has_no_executable_lines() {
        let source = "PACKAGE pay IS
  FUNCTION net(gross NUMBER) RETURN NUMBER;
  PROCEDURE run;
END pay;
";
        assert!(executable_lines(source).is_empty());
        assert!(check_structure(&source.split_inclusive('\n').collect::<Vec<_>>()).is_ok());
    }

    #[test]
    fn test_package_body_with_nested_units_and_init() {
        let source = "PACKAGE BODY pay IS
  g NUMBER := 1;
  FUNCTION net(gross NUMBER) RETURN NUMBER IS
  BEGIN
    RETURN gross * 0.8;
  END net;
  PROCEDURE run IS
    l NUMBER;
  BEGIN
    l := net(100);
  END run;
BEGIN
  g := 2;
END pay;
";
        assert_eq!(executable_lines(source), vec![5, 10, 13]);
        assert!(check_structure(&source.split_inclusive('\n').collect::<Vec<_>>()).is_ok());
    }

    #[test]
    fn test_trigger_body() {
        let source = "TRIGGER emp_bi BEFORE INSERT ON emp FOR EACH ROW
WHEN (new.id IS NULL)
BEGIN
  :new.id := emp_seq.nextval;
END;
";
        assert_eq!(executable_lines(source), vec![4]);
        assert_eq!(points(source)[3], Some(2));
    }

    #[test]
    fn test_nested_anonymous_block() {
        let source = "PROCEDURE p IS
BEGIN
  DECLARE
    v NUMBER;
  BEGIN
    v := 1;
  EXCEPTION WHEN OTHERS THEN NULL;
  END;
END;
";
        assert_eq!(executable_lines(source), vec![6, 7]);
    }

    #[test]
    fn test_label_moves_injection_point() {
        let source = "PROCEDURE p IS
BEGIN
  <<outer>>
  FOR i IN 1..3 LOOP
    EXIT outer WHEN i = 2;
  END LOOP outer;
END;
";
        assert_eq!(executable_lines(source), vec![3, 5]);
        assert_eq!(points(source)[2], Some(2));
    }

    #[test]
    fn test_strings_hide_keywords() {
        let source = "PROCEDURE p IS
BEGIN
  v := 'BEGIN END; IF';
  w := q'[it's END;
  still string]';
  z := \"END\";
END;
";
        assert_eq!(executable_lines(source), vec![3, 4, 6]);
        assert!(check_structure(&source.split_inclusive('\n').collect::<Vec<_>>()).is_ok());
    }

    #[test]
    fn test_structure_errors() {
        let unclosed = ["PROCEDURE p IS\n", "BEGIN\n", "  NULL;\n"];
        assert!(check_structure(&unclosed).is_err());

        let extra_end = ["BEGIN\n", "  NULL;\n", "END;\n", "END;\n"];
        assert!(check_structure(&extra_end).is_err());

        let open_comment = ["BEGIN\n", "  NULL; /* never closed\n", "END;\n"];
        assert!(check_structure(&open_comment).is_err());
    }

    #[test]
    fn test_injected_call_keeps_structure() {
        let instrumented = [
            "FUNCTION f RETURN NUMBER IS\n",
            "BEGIN\n",
            "  plspec_coverage.hit('HR', 'F', 'FUNCTION', 1); RETURN 1;\n",
            "END;\n",
        ];
        assert!(check_structure(&instrumented).is_ok());
    }

    #[test]
    fn test_merge_is_one_statement() {
        let source = "PROCEDURE p IS
BEGIN
  MERGE INTO emp e
  USING src s ON (e.id = s.id)
  WHEN MATCHED THEN UPDATE SET e.sal = s.sal
  WHEN NOT MATCHED THEN
    INSERT (id, sal) VALUES (s.id, s.sal);
  COMMIT;
END;
";
        assert_eq!(executable_lines(source), vec![3, 8]);
        assert!(check_structure(&source.split_inclusive('\n').collect::<Vec<_>>()).is_ok());
    }

    #[test]
    fn test_multi_table_insert_is_one_statement() {
        let source = "PROCEDURE p IS
BEGIN
  INSERT ALL
    WHEN sal > 1000 THEN INTO big VALUES (id)
    ELSE INTO small VALUES (id)
  SELECT id, sal FROM emp;
  IF SQL%ROWCOUNT > 0 THEN
    NULL;
  END IF;
END;
";
        assert_eq!(executable_lines(source), vec![3, 7, 8]);
    }

    #[test]
    fn test_conditional_compilation_directives() {
        let source = "PROCEDURE p IS
BEGIN
  $IF DBMS_DB_VERSION.VER_LE_10 $THEN
    x := 1;
  $ELSIF $$debug $THEN
    x := 2;
  $ELSE
    $ERROR 'unsupported ' || $$PLSQL_UNIT $END
  $END
  v := $$PLSQL_LINE;
END;
";
        assert_eq!(executable_lines(source), vec![4, 6, 10]);
        assert!(check_structure(&source.split_inclusive('\n').collect::<Vec<_>>()).is_ok());
    }

    #[test]
    fn test_directive_end_does_not_close_blocks() {
        let lines = [
            "BEGIN\n",
            "  $IF $$trace $THEN log_it; $END\n",
            "  NULL;\n",
            "END;\n",
        ];
        assert!(check_structure(&lines).is_ok());
        let points = classify(&lines).points;
        assert_eq!(points[1], Some(20));
        assert_eq!(points[2], Some(2));
    }
}
