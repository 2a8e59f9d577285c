use rustc_hash::FxHashMap;

/// One bound value of a call. Natives receive them positionally with no name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Argument<'a> {
    pub name: Option<&'a str>,
    pub value: f32,
}

impl Argument<'_> {
    pub fn positional(value: f32) -> Self {
        Self { name: None, value }
    }
}

pub type Native = fn(&[Argument<'_>]) -> f32;

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub function: Native,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Builtin<{}>({})", self.name, self.arity)
    }
}

impl NativeFunction {
    pub fn call(&self, arguments: &[Argument<'_>]) -> f32 {
        (self.function)(arguments)
    }
}

/// Named constants and native functions visible to every program.
#[derive(Debug, Clone, Default)]
pub struct Builtins {
    constants: FxHashMap<&'static str, f32>,
    functions: FxHashMap<&'static str, NativeFunction>,
}

impl Builtins {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        Self::empty()
            .with_constant("e", std::f32::consts::E)
            .with_constant("pi", std::f32::consts::PI)
            .with_constant("tau", std::f32::consts::TAU)
            .with_function("sin", 1, |args| args[0].value.sin())
            .with_function("cos", 1, |args| args[0].value.cos())
            .with_function("tan", 1, |args| args[0].value.tan())
            .with_function("sqrt", 1, |args| args[0].value.sqrt())
            .with_function("exp", 1, |args| args[0].value.exp())
            .with_function("ln", 1, |args| args[0].value.ln())
            .with_function("log", 2, |args| args[1].value.log(args[0].value))
            .with_function("abs", 1, |args| args[0].value.abs())
            .with_function("floor", 1, |args| args[0].value.floor())
            .with_function("ceil", 1, |args| args[0].value.ceil())
            .with_function("min", 2, |args| args[0].value.min(args[1].value))
            .with_function("max", 2, |args| args[0].value.max(args[1].value))
    }

    pub fn with_constant(mut self, name: &'static str, value: f32) -> Self {
        self.constants.insert(name, value);
        self
    }

    pub fn with_function(mut self, name: &'static str, arity: usize, function: Native) -> Self {
        self.functions.insert(
            name,
            NativeFunction {
                name,
                arity,
                function,
            },
        );
        self
    }

    pub fn constant(&self, name: &str) -> Option<f32> {
        self.constants.get(name).copied()
    }

    pub fn function(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constants.contains_key(name) || self.functions.contains_key(name)
    }
}
