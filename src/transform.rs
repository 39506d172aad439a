//! Script transform hook.
//!
//! Bundling (inlining support modules, rewriting imports) happens outside this
//! crate. The builder only needs a pure `text -> text` function and treats its
//! output as opaque payload.

/// Turns a script into the payload that gets packaged.
pub trait ScriptTransform {
    /// Transform the script source.
    fn transform(&self, script: &str) -> String;
}

/// Packages the script unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl ScriptTransform for Passthrough {
    fn transform(&self, script: &str) -> String {
        script.to_string()
    }
}

impl<F: Fn(&str) -> String> ScriptTransform for F {
    fn transform(&self, script: &str) -> String {
        self(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        assert_eq!(Passthrough.transform("print('hi')\n"), "print('hi')\n");
    }

    #[test]
    fn test_closure_transform() {
        let upper = |s: &str| s.to_uppercase();
        let t: &dyn ScriptTransform = &upper;
        assert_eq!(t.transform("abc"), "ABC");
    }
}
