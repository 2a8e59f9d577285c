/// Resource bounds and tolerances for a single program run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Most statements a program may hold.
    pub capacity: usize,
    /// Deepest chain of nested user function calls.
    pub max_call_depth: usize,
    /// Tallest syntax tree a single statement may produce.
    pub max_nesting_depth: usize,
    /// Deepest chain of nodes being evaluated at once, across variable
    /// references and calls.
    pub max_evaluation_depth: usize,
    /// Absolute difference an `ASSERT` accepts.
    pub tolerance: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 256,
            max_call_depth: 64,
            max_nesting_depth: 256,
            max_evaluation_depth: 256,
            tolerance: 1e-6,
        }
    }
}
