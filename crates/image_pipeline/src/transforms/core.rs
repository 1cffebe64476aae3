use anyhow::{Context, Result};
use std::marker::PhantomData;

/// A stateless step that turns an input of type `I` into an output of type `O`.
///
/// Steps are chained with `.then(...)` into a single pipeline that a worker
/// thread can run without any dynamic dispatch between stages.
///
/// Note: `then()` works only when:
/// 1. **Types align**: `self: Transform<I, O>`, `next: Transform<O, M>`
/// 2. **Owned**: `Self::Sized` (no trait objects, must be concrete)
/// 3. **Thread-safe**: intermediate and output types must be `Send`
pub trait Transform<I, O>: Send + Sync {
    /// Applies the transformation to the input
    fn apply(&self, input: I) -> Result<O>;

    #[inline]
    fn then<T, M>(self, next: T) -> Chain<Self, T, O>
    where
        Self: Sized,
        T: Transform<O, M>,
        O: Send,
        M: Send,
    {
        Chain {
            first: self,
            second: next,
            _marker: PhantomData,
        }
    }
}

/// A chain of two transforms (`A` -> `B`)
/// - `PhantomData<M>` enforces intermediate type alignment.
#[derive(Debug)]
pub struct Chain<A, B, M> {
    first: A,
    second: B,
    _marker: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _marker: PhantomData,
        }
    }
}

impl<I, M, O, A, B> Transform<I, O> for Chain<A, B, M>
where
    A: Transform<I, M>,
    B: Transform<M, O>,
    M: Send,
{
    fn apply(&self, input: I) -> Result<O> {
        let mid = self.first.apply(input)?;
        self.second.apply(mid).with_context(|| {
            format!(
                "Transform chain failed: {} → {}",
                std::any::type_name::<A>(),
                std::any::type_name::<B>()
            )
        })
    }
}

/// Closures can stand in for a transform, which keeps test doubles short.
impl<I, O, F> Transform<I, O> for F
where
    F: Fn(I) -> Result<O> + Send + Sync,
{
    fn apply(&self, input: I) -> Result<O> {
        self(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::path::PathBuf;

    struct FileStem;
    impl Transform<PathBuf, String> for FileStem {
        fn apply(&self, input: PathBuf) -> Result<String> {
            input
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_owned)
                .ok_or_else(|| anyhow!("no file stem in {}", input.display()))
        }
    }

    struct ParseIndex;
    impl Transform<String, usize> for ParseIndex {
        fn apply(&self, input: String) -> Result<usize> {
            Ok(input.parse()?)
        }
    }

    #[test]
    fn test_then_runs_both_steps() -> Result<()> {
        let pipeline = FileStem.then(ParseIndex);
        assert_eq!(pipeline.apply(PathBuf::from("n01440764/0042.JPEG"))?, 42);
        Ok(())
    }

    #[test]
    fn test_chain_new_matches_then() -> Result<()> {
        let chain = Chain::new(FileStem, ParseIndex);
        assert_eq!(chain.apply(PathBuf::from("cat/7.png"))?, 7);
        Ok(())
    }

    #[test]
    fn test_closure_transform() -> Result<()> {
        let double = |x: usize| -> Result<usize> { Ok(x * 2) };
        let pipeline = FileStem.then(ParseIndex).then(double);
        assert_eq!(pipeline.apply(PathBuf::from("dog/21.png"))?, 42);
        Ok(())
    }

    #[test]
    fn test_chain_error_context() {
        let chain = Chain::new(FileStem, ParseIndex);
        let err = chain
            .apply(PathBuf::from("cat/not-a-number.png"))
            .unwrap_err();
        let msg = format!("{:#}", err);

        assert!(msg.contains("Transform chain failed"));
        assert!(msg.contains("ParseIndex"));
    }
}
