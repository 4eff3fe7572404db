use crate::core::models::topology::{AtomInfo, Topology};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SelectionError {
    #[error("Unexpected end of selection query")]
    UnexpectedEnd,
    #[error("Unexpected token '{0}' in selection query")]
    UnexpectedToken(String),
    #[error("Unterminated quoted value in selection query")]
    UnterminatedQuote,
    #[error("Keyword '{0}' requires at least one value")]
    MissingValue(String),
    #[error("Invalid integer '{value}' for keyword '{field}'")]
    InvalidNumber { field: String, value: String },
    #[error("Operator '{op}' cannot be applied to keyword '{field}'")]
    UnsupportedOperator { field: String, op: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    ResName,
    Element,
    ResSeq,
    ResIndex,
    Index,
}

impl Field {
    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "name" => Some(Field::Name),
            "resname" => Some(Field::ResName),
            "element" | "symbol" => Some(Field::Element),
            "resSeq" | "resseq" => Some(Field::ResSeq),
            "resid" | "resi" => Some(Field::ResIndex),
            "index" => Some(Field::Index),
            _ => None,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Field::ResSeq | Field::ResIndex | Field::Index)
    }

    fn keyword(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::ResName => "resname",
            Field::Element => "element",
            Field::ResSeq => "resSeq",
            Field::ResIndex => "resid",
            Field::Index => "index",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "==" | "=" | "eq" => Some(CmpOp::Eq),
            "!=" | "ne" => Some(CmpOp::Ne),
            "<" | "lt" => Some(CmpOp::Lt),
            "<=" | "le" => Some(CmpOp::Le),
            ">" | "gt" => Some(CmpOp::Gt),
            ">=" | "ge" => Some(CmpOp::Ge),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn compare<T: PartialOrd>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Range(i64, i64),
}

/// A parsed atom-selection expression, e.g. `protein and element != 'H'`.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    All,
    None,
    Protein,
    Water,
    Backbone,
    Sidechain,
    Heavy,
    Compare {
        field: Field,
        op: CmpOp,
        values: Vec<Value>,
    },
    Not(Box<Selection>),
    And(Box<Selection>, Box<Selection>),
    Or(Box<Selection>, Box<Selection>),
}

impl Selection {
    pub fn matches(&self, topology: &Topology, atom: &AtomInfo) -> bool {
        match self {
            Selection::All => true,
            Selection::None => false,
            Selection::Protein => topology.residue_of(atom).is_protein(),
            Selection::Water => topology.residue_of(atom).is_water(),
            Selection::Backbone => topology.is_backbone(atom),
            Selection::Sidechain => {
                topology.residue_of(atom).is_protein() && !topology.is_backbone(atom)
            }
            Selection::Heavy => topology.is_heavy(atom),
            Selection::Compare { field, op, values } => {
                compare_field(topology, atom, *field, *op, values)
            }
            Selection::Not(inner) => !inner.matches(topology, atom),
            Selection::And(a, b) => a.matches(topology, atom) && b.matches(topology, atom),
            Selection::Or(a, b) => a.matches(topology, atom) || b.matches(topology, atom),
        }
    }

    /// Indices of all atoms of `topology` matched by this selection, in order.
    pub fn select(&self, topology: &Topology) -> Vec<usize> {
        topology
            .atoms()
            .iter()
            .filter(|atom| self.matches(topology, atom))
            .map(|atom| atom.index)
            .collect()
    }
}

fn compare_field(
    topology: &Topology,
    atom: &AtomInfo,
    field: Field,
    op: CmpOp,
    values: &[Value],
) -> bool {
    let residue = topology.residue_of(atom);
    let number = match field {
        Field::ResSeq => residue.seq as i64,
        Field::ResIndex => residue.index as i64,
        _ => atom.index as i64,
    };
    let equals = |value: &Value| -> bool {
        match (field, value) {
            (Field::Name, Value::Text(v)) => atom.name == *v,
            (Field::ResName, Value::Text(v)) => residue.name == *v,
            (Field::Element, Value::Text(v)) => atom.element.eq_ignore_ascii_case(v),
            (_, Value::Int(v)) => number == *v,
            (_, Value::Range(lo, hi)) => number >= *lo && number <= *hi,
            _ => false,
        }
    };
    match op {
        CmpOp::Eq => values.iter().any(equals),
        CmpOp::Ne => !values.iter().any(equals),
        _ => values.iter().all(|value| match value {
            Value::Int(v) => op.compare(&number, v),
            _ => false,
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Op(String),
    LParen,
    RParen,
}

fn tokenize(query: &str) -> Result<Vec<Token>, SelectionError> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => value.push(ch),
                        None => return Err(SelectionError::UnterminatedQuote),
                    }
                }
                tokens.push(Token::Quoted(value));
            }
            '=' | '!' | '<' | '>' => {
                let mut op = String::new();
                while let Some(&ch) = chars.peek() {
                    if matches!(ch, '=' | '!' | '<' | '>') {
                        op.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Op(op));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | '=' | '!' | '<' | '>') {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w == word)
    }

    fn parse_or(&mut self) -> Result<Selection, SelectionError> {
        let mut lhs = self.parse_and()?;
        while self.peek_word("or") {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Selection::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Selection, SelectionError> {
        let mut lhs = self.parse_unary()?;
        while self.peek_word("and") {
            self.next();
            let rhs = self.parse_unary()?;
            lhs = Selection::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Selection, SelectionError> {
        match self.next().ok_or(SelectionError::UnexpectedEnd)? {
            Token::Word(w) if w == "not" => Ok(Selection::Not(Box::new(self.parse_unary()?))),
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(SelectionError::UnexpectedToken(token_text(&other))),
                    None => Err(SelectionError::UnexpectedEnd),
                }
            }
            Token::Word(w) => self.parse_keyword(&w),
            other => Err(SelectionError::UnexpectedToken(token_text(&other))),
        }
    }

    fn parse_keyword(&mut self, word: &str) -> Result<Selection, SelectionError> {
        let selection = match word {
            "all" | "everything" => Selection::All,
            "none" | "nothing" => Selection::None,
            "protein" | "is_protein" => Selection::Protein,
            "water" | "is_water" => Selection::Water,
            "backbone" | "is_backbone" => Selection::Backbone,
            "sidechain" | "is_sidechain" => Selection::Sidechain,
            "heavy" => Selection::Heavy,
            _ => {
                let field = Field::from_keyword(word)
                    .ok_or_else(|| SelectionError::UnexpectedToken(word.to_string()))?;
                return self.parse_comparison(field);
            }
        };
        Ok(selection)
    }

    fn parse_comparison(&mut self, field: Field) -> Result<Selection, SelectionError> {
        let op = match self.peek() {
            Some(Token::Op(op)) => {
                let parsed = CmpOp::from_token(op)
                    .ok_or_else(|| SelectionError::UnexpectedToken(op.clone()))?;
                self.next();
                parsed
            }
            Some(Token::Word(w)) if CmpOp::from_token(w).is_some() => {
                let parsed = CmpOp::from_token(w).unwrap_or(CmpOp::Eq);
                self.next();
                parsed
            }
            _ => CmpOp::Eq,
        };
        if !field.is_numeric() && !matches!(op, CmpOp::Eq | CmpOp::Ne) {
            return Err(SelectionError::UnsupportedOperator {
                field: field.keyword().to_string(),
                op: op.symbol().to_string(),
            });
        }

        let mut raw_values = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                Token::Word(w) if matches!(w.as_str(), "and" | "or" | "not") => break,
                Token::Word(w) | Token::Quoted(w) => {
                    raw_values.push(w.clone());
                    self.next();
                }
                _ => break,
            }
        }
        if raw_values.is_empty() {
            return Err(SelectionError::MissingValue(field.keyword().to_string()));
        }

        let values = if field.is_numeric() {
            parse_numeric_values(field, &raw_values)?
        } else {
            raw_values.into_iter().map(Value::Text).collect()
        };
        Ok(Selection::Compare { field, op, values })
    }
}

fn parse_numeric_values(field: Field, raw: &[String]) -> Result<Vec<Value>, SelectionError> {
    let parse = |s: &str| -> Result<i64, SelectionError> {
        s.parse().map_err(|_| SelectionError::InvalidNumber {
            field: field.keyword().to_string(),
            value: s.to_string(),
        })
    };
    let mut values = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        if raw.get(i + 1).is_some_and(|w| w == "to") {
            let hi = raw
                .get(i + 2)
                .ok_or_else(|| SelectionError::MissingValue(field.keyword().to_string()))?;
            values.push(Value::Range(parse(&raw[i])?, parse(hi)?));
            i += 3;
        } else {
            values.push(Value::Int(parse(&raw[i])?));
            i += 1;
        }
    }
    Ok(values)
}

fn token_text(token: &Token) -> String {
    match token {
        Token::Word(w) | Token::Quoted(w) | Token::Op(w) => w.clone(),
        Token::LParen => "(".to_string(),
        Token::RParen => ")".to_string(),
    }
}

impl FromStr for Selection {
    type Err = SelectionError;

    fn from_str(query: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(query)?;
        if tokens.is_empty() {
            return Err(SelectionError::UnexpectedEnd);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let selection = parser.parse_or()?;
        match parser.next() {
            None => Ok(selection),
            Some(token) => Err(SelectionError::UnexpectedToken(token_text(&token))),
        }
    }
}

/// Parses `query` and returns the indices of the matching atoms.
pub fn select(topology: &Topology, query: &str) -> Result<Vec<usize>, SelectionError> {
    Ok(query.parse::<Selection>()?.select(topology))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> Topology {
        let mut top = Topology::new();
        top.push_atom("N", "ALA", 10, 1);
        top.push_atom("CA", "ALA", 10, 2);
        top.push_atom("HA", "ALA", 10, 3);
        top.push_atom("CB", "ALA", 10, 4);
        top.push_atom("N", "LYS", 11, 5);
        top.push_atom("CA", "LYS", 11, 6);
        top.push_atom("NZ", "LYS", 11, 7);
        top.push_atom("OW", "SOL", 12, 8);
        top.push_atom("HW1", "SOL", 12, 9);
        top
    }

    #[test]
    fn keywords_select_expected_atoms() {
        let top = topology();
        assert_eq!(select(&top, "all").unwrap().len(), 9);
        assert_eq!(select(&top, "protein").unwrap(), vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(select(&top, "water").unwrap(), vec![7, 8]);
        assert_eq!(select(&top, "backbone").unwrap(), vec![0, 1, 2, 4, 5]);
        assert_eq!(select(&top, "sidechain").unwrap(), vec![3, 6]);
    }

    #[test]
    fn common_selection_queries_are_supported() {
        let top = topology();
        assert_eq!(select(&top, "protein and name CA").unwrap(), vec![1, 5]);
        assert_eq!(
            select(&top, "protein and element != 'H'").unwrap(),
            vec![0, 1, 3, 4, 5, 6]
        );
        assert_eq!(
            select(&top, "name CA and (resSeq 10 or resSeq 11)").unwrap(),
            vec![1, 5]
        );
        assert_eq!(select(&top, "not protein").unwrap(), vec![7, 8]);
        assert_eq!(select(&top, "name N CA").unwrap(), vec![0, 1, 4, 5]);
        assert_eq!(select(&top, "resname == \"LYS\"").unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn numeric_comparisons_and_ranges_work() {
        let top = topology();
        assert_eq!(select(&top, "resSeq > 10").unwrap(), vec![4, 5, 6, 7, 8]);
        assert_eq!(select(&top, "index 1 to 3").unwrap(), vec![1, 2, 3]);
        assert_eq!(select(&top, "resid 2").unwrap(), vec![7, 8]);
        assert_eq!(select(&top, "index != 0 and resSeq 10").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn malformed_queries_are_rejected() {
        let top = topology();
        assert_eq!(select(&top, ""), Err(SelectionError::UnexpectedEnd));
        assert_eq!(select(&top, "protein and"), Err(SelectionError::UnexpectedEnd));
        assert_eq!(
            select(&top, "name 'CA"),
            Err(SelectionError::UnterminatedQuote)
        );
        assert_eq!(
            select(&top, "name"),
            Err(SelectionError::MissingValue("name".to_string()))
        );
        assert!(matches!(
            select(&top, "resSeq abc"),
            Err(SelectionError::InvalidNumber { .. })
        ));
        assert!(matches!(
            select(&top, "name > CA"),
            Err(SelectionError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            select(&top, "banana"),
            Err(SelectionError::UnexpectedToken(_))
        ));
        assert!(matches!(
            select(&top, "(protein"),
            Err(SelectionError::UnexpectedEnd)
        ));
    }
}
