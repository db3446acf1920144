use core::fmt::{self, Display};

/// Displays items of an iterator separated by commas.
#[derive(Clone, Copy)]
pub(crate) struct Punctuated<I>(pub I);

impl<I> Display for Punctuated<I>
where
    I: IntoIterator + Clone,
    I::Item: Display,
{
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.clone().into_iter().enumerate() {
            if i > 0 {
                fmt.write_str(", ")?;
            }
            item.fmt(fmt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_are_comma_separated() {
        assert_eq!(Punctuated(["a", "b", "c"]).to_string(), "a, b, c");
        assert_eq!(Punctuated(Vec::<u32>::new()).to_string(), "");
    }
}
