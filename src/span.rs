#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl std::ops::Add<Span> for Span {
    type Output = Span;

    fn add(self, other: Span) -> Span {
        let start = if (self.start_line, self.start_column) < (other.start_line, other.start_column)
        {
            &self
        } else {
            &other
        };
        let end = if (self.end_line, self.end_column) > (other.end_line, other.end_column) {
            &self
        } else {
            &other
        };

        Span {
            start_line: start.start_line,
            start_column: start.start_column,
            end_line: end.end_line,
            end_column: end.end_column,
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_covers_both() {
        let a = Span {
            start_line: 1,
            start_column: 4,
            end_line: 1,
            end_column: 5,
        };
        let b = Span {
            start_line: 1,
            start_column: 1,
            end_line: 1,
            end_column: 2,
        };
        let joined = a + b;
        assert_eq!(joined.start_column, 1);
        assert_eq!(joined.end_column, 5);
        assert_eq!(joined.to_string(), "1:1");
    }
}
