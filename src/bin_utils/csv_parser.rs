use std::io::Read;

use crate::command::CommandRecord;
use csv::{DeserializeRecordsIntoIter, Trim};

/// Reads a command stream in CSV format, yielding each record with the line it
/// was read from.
pub struct CsvCommandParser<R> {
    iter: DeserializeRecordsIntoIter<R, CommandRecord>,
}

impl<R> CsvCommandParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            iter: reader.into_deserialize(),
        }
    }
}

impl<R> Iterator for CsvCommandParser<R>
where
    R: Read,
{
    type Item = (u64, csv::Result<CommandRecord>);

    fn next(&mut self) -> Option<Self::Item> {
        let curr_line = self.iter.reader().position().line();
        self.iter.next().map(|row| (curr_line, row))
    }
}
