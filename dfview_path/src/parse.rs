use std::{iter::Peekable, str::Chars};

use crate::{PathItem, PathParseError};

/// Parse a path from its string syntax.
pub fn parse_path(source: &str) -> Result<Vec<PathItem>, PathParseError> {
    Parser::new(source).parse()
}

struct Parser<'s> {
    chars: Peekable<Chars<'s>>,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        Parser {
            chars: source.chars().peekable(),
        }
    }

    fn parse(mut self) -> Result<Vec<PathItem>, PathParseError> {
        let mut items = Vec::new();
        items.push(match self.chars.peek() {
            Some('(') => self.container_of()?,
            _ => PathItem::Field(self.name()?),
        });
        while let Some(&c) = self.chars.peek() {
            match c {
                '.' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'(') {
                        items.push(self.container_of()?);
                    } else {
                        items.push(PathItem::Field(self.name()?));
                    }
                }
                '[' => items.push(self.index()?),
                _ => return Err(self.expected("`.` or `[`")),
            }
        }
        Ok(items)
    }

    fn container_of(&mut self) -> Result<PathItem, PathParseError> {
        self.char('(')?;
        let name = self.name()?;
        self.char(')')?;
        Ok(PathItem::ContainerOf(name))
    }

    fn index(&mut self) -> Result<PathItem, PathParseError> {
        self.char('[')?;
        let item = match self.chars.peek() {
            Some(c) if c.is_ascii_digit() => PathItem::Index(self.usize()?),
            Some(c) if c.is_ascii_alphabetic() || *c == '_' => PathItem::EnumIndex(self.name()?),
            _ => return Err(self.expected("an index")),
        };
        self.char(']')?;
        Ok(item)
    }

    fn name(&mut self) -> Result<String, PathParseError> {
        let mut name = String::new();
        match self.chars.peek() {
            Some(&c) if c.is_ascii_alphabetic() || c == '_' => {
                name.push(c);
                self.chars.next();
            }
            _ => return Err(self.expected("an identifier")),
        }
        while let Some(&c) = self
            .chars
            .peek()
            .filter(|&&c| c.is_ascii_alphanumeric() || c == '_')
        {
            name.push(c);
            self.chars.next();
        }
        Ok(name)
    }

    fn usize(&mut self) -> Result<usize, PathParseError> {
        let mut digits = String::new();
        while let Some(&c) = self.chars.peek().filter(|c| c.is_ascii_digit()) {
            digits.push(c);
            self.chars.next();
        }
        digits
            .parse()
            .map_err(|_| PathParseError(format!("integer out of range: {}", digits)))
    }

    fn char(&mut self, c: char) -> Result<(), PathParseError> {
        if self.chars.peek() == Some(&c) {
            self.chars.next();
            Ok(())
        } else {
            Err(self.expected(format!("`{}`", c)))
        }
    }

    fn expected(&mut self, expected: impl Into<String>) -> PathParseError {
        match self.chars.peek() {
            Some(c) => PathParseError(format!("expected {}, found `{}`", expected.into(), c)),
            None => PathParseError(format!("expected {}, reached end of string", expected.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items() {
        assert_eq!(
            parse_path("global_name.container[1].member").unwrap(),
            vec![
                PathItem::field("global_name"),
                PathItem::field("container"),
                PathItem::index(1),
                PathItem::field("member"),
            ]
        );
        assert_eq!(
            parse_path("unit.(item_type)").unwrap(),
            vec![PathItem::field("unit"), PathItem::container_of("item_type")]
        );
        assert_eq!(
            parse_path("labors[HAUL_STONE]").unwrap(),
            vec![PathItem::field("labors"), PathItem::enum_index("HAUL_STONE")]
        );
    }

    #[test]
    fn syntax_errors() {
        assert!(parse_path("").is_err());
        assert!(parse_path("a.").is_err());
        assert!(parse_path("a[").is_err());
        assert!(parse_path("a[]").is_err());
        assert!(parse_path("a[3").is_err());
        assert!(parse_path("a.(b").is_err());
        assert!(parse_path("a b").is_err());
        assert!(parse_path("3a").is_err());
    }
}
