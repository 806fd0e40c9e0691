//! Per-hop message transformation

/// Transforms a message body once per hop
pub trait Refiner: Send + Sync {
    fn refine(&self, body: &str) -> String;
}

impl<F> Refiner for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn refine(&self, body: &str) -> String {
        self(body)
    }
}

/// Upper-cases the body
#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseRefiner;

impl Refiner for UppercaseRefiner {
    fn refine(&self, body: &str) -> String {
        body.to_uppercase()
    }
}

/// Leaves the body untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRefiner;

impl Refiner for IdentityRefiner {
    fn refine(&self, body: &str) -> String {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_refiners() {
        assert_eq!(UppercaseRefiner.refine("hello"), "HELLO");
        assert_eq!(IdentityRefiner.refine("hello"), "hello");
    }

    #[test]
    fn test_closure_refiner() {
        let reverse = |body: &str| body.chars().rev().collect::<String>();
        assert_eq!(reverse.refine("abc"), "cba");

        let boxed: Box<dyn Refiner> = Box::new(reverse);
        assert_eq!(boxed.refine("xy"), "yx");
    }
}
