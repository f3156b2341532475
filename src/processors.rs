//! Batch stages of the pipeline.
//!
//! Every stage takes entries one at a time and hands back everything it produced on
//! [`Processor::flush`], which also leaves the stage ready for another run.

pub use self::accounting::{AccountingProcessor, MultiExchangeAccounting};
pub use self::chronological::{chronological, Chronological};
pub use self::costunit::{CostUnitTranslator, TranslateError};
pub use self::grouping::{GroupKey, GroupingEngine};

mod accounting;
mod chronological;
mod costunit;
mod grouping;

pub trait Processor {
    type Input;
    type Output;
    type Error;

    fn process(&mut self, input: Self::Input) -> Result<(), Self::Error>;

    /// Process inputs in order, stopping at the first error.
    fn process_many<I>(&mut self, inputs: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Input>,
    {
        for input in inputs {
            self.process(input)?;
        }

        Ok(())
    }

    /// Take everything produced so far and reset.
    fn flush(&mut self) -> Self::Output;

    /// Drop all state, returning to a freshly constructed processor.
    fn reset(&mut self);
}
