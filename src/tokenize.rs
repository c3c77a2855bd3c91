//! Small token-level helpers shared by the state machine and the tree
//! builder. None of these panic on malformed input.

use nom::bytes::complete as bytes;
use nom::character::complete as character;
use nom::combinator;
use nom::sequence;

use crate::error::HeapNodeError;

/// Split at the first occurrence of `sep`. Surrounding whitespace is kept.
pub(crate) fn split_once<'a>(line: &'a str, sep: &str) -> Option<(&'a str, &'a str)> {
    line.find(sep)
        .map(|at| (&line[..at], &line[at + sep.len()..]))
}

/// The number of leading ASCII space characters. Tabs do not count and stay
/// in the token stream, where they fail token parsing.
pub(crate) fn leading_spaces(line: &str) -> usize {
    line.bytes().take_while(|&b| b == b' ').count()
}

/// Strict non-negative decimal: no sign, no surrounding whitespace, no
/// overflow.
pub(crate) fn parse_unsigned(s: &str) -> Option<u64> {
    let parsed: nom::IResult<&str, u64> = combinator::all_consuming(combinator::map_res(
        character::digit1,
        |digits: &str| digits.parse::<u64>(),
    ))(s);

    parsed.ok().map(|(_, value)| value)
}

/// The `n<k>:` arity token that starts every heap tree node line.
pub(crate) fn parse_child_count(tok: &str) -> Result<u32, HeapNodeError> {
    let parsed: nom::IResult<&str, u32> = combinator::all_consuming(sequence::delimited(
        bytes::tag("n"),
        combinator::map_res(character::digit1, |digits: &str| digits.parse::<u32>()),
        bytes::tag(":"),
    ))(tok);

    parsed
        .map(|(_, count)| count)
        .map_err(|_| HeapNodeError::BadChildCountToken(tok.to_string()))
}
