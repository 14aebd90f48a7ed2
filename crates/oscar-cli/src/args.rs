//! Command-line argument syntax for `oscar send`
//!
//! | form      | argument          |
//! |-----------|-------------------|
//! | `i:42`    | int32             |
//! | `h:42`    | int64             |
//! | `f:1.5`   | float32           |
//! | `d:1.5`   | float64           |
//! | `s:text`  | string            |
//! | `b:00ff`  | blob (hex)        |
//! | `t:<u64>` | time tag          |
//! | `T` `F` `N` | true, false, nil |
//!
//! Anything else is inferred: int32, then float32, then string.

use anyhow::{anyhow, bail, Context, Result};
use oscar_core::{Argument, Timetag};

pub fn parse_argument(raw: &str) -> Result<Argument> {
    match raw {
        "T" => return Ok(Argument::True),
        "F" => return Ok(Argument::False),
        "N" => return Ok(Argument::Nil),
        _ => {}
    }

    let Some((prefix, value)) = raw.split_once(':') else {
        return Ok(infer(raw));
    };

    let arg = match prefix {
        "i" => Argument::Int32(value.parse().with_context(|| bad("int32", raw))?),
        "h" => Argument::Int64(value.parse().with_context(|| bad("int64", raw))?),
        "f" => Argument::Float32(value.parse().with_context(|| bad("float32", raw))?),
        "d" => Argument::Float64(value.parse().with_context(|| bad("float64", raw))?),
        "s" => Argument::String(value.to_string()),
        "b" => Argument::Blob(parse_hex(value).with_context(|| bad("blob", raw))?),
        "t" => Argument::TimeTag(Timetag::new(
            value.parse().with_context(|| bad("time tag", raw))?,
        )),
        // e.g. "host:port" or "a:b" meant as text
        _ => infer(raw),
    };
    Ok(arg)
}

pub fn parse_arguments<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Argument>> {
    raw.iter().map(|s| parse_argument(s.as_ref())).collect()
}

fn infer(raw: &str) -> Argument {
    if let Ok(i) = raw.parse::<i32>() {
        return Argument::Int32(i);
    }
    // "nan" and "inf" stay strings
    if raw.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(f) = raw.parse::<f32>() {
            return Argument::Float32(f);
        }
    }
    Argument::String(raw.to_string())
}

fn parse_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        bail!("hex blob needs a non-zero, even number of digits");
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| anyhow!("invalid hex digits at offset {}", i))
        })
        .collect()
}

fn bad(kind: &str, raw: &str) -> String {
    format!("Invalid {} argument: {}", kind, raw)
}
