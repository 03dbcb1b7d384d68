//! Text renderings for types with no lossless Rust counterpart
//!
//! These decode the binary wire format directly and print the same text
//! PostgreSQL itself would. `numeric` keeps every digit beyond what a
//! decimal type can hold, including `NaN`.

use std::error::Error;
use std::fmt::{self, Write};
use std::net::IpAddr;

use postgres_protocol::types::inet_from_sql;
use tokio_postgres::types::{FromSql, Type};

type DecodeError = Box<dyn Error + Sync + Send>;

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Big-endian cursor over a wire value.
struct Reader<'a>(&'a [u8]);

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        if self.0.len() < N {
            return Err("unexpected end of value".into());
        }
        let (head, rest) = self.0.split_at(N);
        self.0 = rest;
        let mut out = [0; N];
        out.copy_from_slice(head);
        Ok(out)
    }

    fn i16(&mut self) -> Result<i16, DecodeError> {
        self.take().map(i16::from_be_bytes)
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.take().map(u16::from_be_bytes)
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        self.take().map(i32::from_be_bytes)
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        self.take().map(i64::from_be_bytes)
    }

    fn finish(self) -> Result<(), DecodeError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err("trailing bytes in value".into())
        }
    }
}

// ============================================================================
// numeric
// ============================================================================

/// A `numeric` value as PostgreSQL prints it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        numeric_text(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

impl fmt::Display for PgNumeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base-10000 digits, a weight for the first digit and a display scale.
fn numeric_text(raw: &[u8]) -> Result<String, DecodeError> {
    let mut reader = Reader(raw);
    let ndigits = reader.i16()?;
    let weight = reader.i16()?;
    let sign = reader.u16()?;
    let dscale = reader.u16()? as usize;
    let digits = (0..ndigits.max(0))
        .map(|_| reader.i16())
        .collect::<Result<Vec<_>, _>>()?;
    reader.finish()?;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digit = |i: i32| -> i16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=i32::from(weight) {
            if i == 0 {
                let _ = write!(out, "{}", digit(i));
            } else {
                let _ = write!(out, "{:04}", digit(i));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = i32::from(weight) + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit(i));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

// ============================================================================
// interval
// ============================================================================

/// An `interval` in PostgreSQL's default output style, e.g.
/// `1 year 2 mons 3 days 04:05:06.5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgInterval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader(raw);
        let micros = reader.i64()?;
        let days = reader.i32()?;
        let months = reader.i32()?;
        reader.finish()?;
        Ok(Self {
            months,
            days,
            micros,
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

impl fmt::Display for PgInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        // A positive field after a negative one carries an explicit '+'.
        let mut is_before = false;
        let mut part = |out: &mut String, value: i32, unit: &str| {
            if value == 0 {
                return;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            let plus = if is_before && value > 0 { "+" } else { "" };
            let plural = if value != 1 { "s" } else { "" };
            let _ = write!(out, "{}{} {}{}", plus, value, unit, plural);
            is_before = value < 0;
        };
        part(&mut out, self.months / 12, "year");
        part(&mut out, self.months % 12, "mon");
        part(&mut out, self.days, "day");

        if self.micros != 0 || out.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            let sign = if self.micros < 0 {
                "-"
            } else if is_before {
                "+"
            } else {
                ""
            };
            let total = self.micros.unsigned_abs();
            let seconds = total / 1_000_000;
            let fraction = total % 1_000_000;
            let _ = write!(
                out,
                "{}{:02}:{:02}:{:02}",
                sign,
                seconds / 3600,
                seconds / 60 % 60,
                seconds % 60
            );
            if fraction != 0 {
                let digits = format!("{:06}", fraction);
                out.push('.');
                out.push_str(digits.trim_end_matches('0'));
            }
        }
        f.write_str(&out)
    }
}

// ============================================================================
// inet / cidr
// ============================================================================

/// An `inet` or `cidr` address. `inet` omits a full-width prefix the way
/// PostgreSQL does; `cidr` always shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgInet {
    pub addr: IpAddr,
    pub netmask: u8,
    pub cidr: bool,
}

impl<'a> FromSql<'a> for PgInet {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let inet = inet_from_sql(raw)?;
        Ok(Self {
            addr: inet.addr(),
            netmask: inet.netmask(),
            cidr: *ty == Type::CIDR,
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INET || *ty == Type::CIDR
    }
}

impl fmt::Display for PgInet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = if self.addr.is_ipv4() { 32 } else { 128 };
        if self.cidr || self.netmask != full {
            write!(f, "{}/{}", self.addr, self.netmask)
        } else {
            write!(f, "{}", self.addr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as i16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    fn decode_numeric(raw: &[u8]) -> String {
        PgNumeric::from_sql(&Type::NUMERIC, raw).unwrap().to_string()
    }

    #[test]
    fn test_numeric_scale_is_kept() {
        assert_eq!(decode_numeric(&numeric(0, 0, 2, &[12, 5000])), "12.50");
        assert_eq!(decode_numeric(&numeric(-1, NUMERIC_NEG, 3, &[10])), "-0.001");
        assert_eq!(decode_numeric(&numeric(0, 0, 0, &[])), "0");
    }

    #[test]
    fn test_numeric_beyond_decimal_range() {
        // 1e30 = 100 * 10000^7
        let text = decode_numeric(&numeric(7, 0, 0, &[100]));
        assert_eq!(text, format!("1{}", "0".repeat(30)));

        let text = decode_numeric(&numeric(0, 0, 30, &[1, 1234]));
        assert_eq!(text, format!("1.1234{}", "0".repeat(26)));
    }

    #[test]
    fn test_numeric_special_values() {
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NAN, 0, &[])), "NaN");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_PINF, 0, &[])), "Infinity");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NINF, 0, &[])), "-Infinity");
    }

    #[test]
    fn test_numeric_truncated_input() {
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &[0, 2, 0, 0]).is_err());
    }

    fn interval(months: i32, days: i32, micros: i64) -> String {
        let mut raw = Vec::new();
        raw.extend_from_slice(&micros.to_be_bytes());
        raw.extend_from_slice(&days.to_be_bytes());
        raw.extend_from_slice(&months.to_be_bytes());
        PgInterval::from_sql(&Type::INTERVAL, &raw).unwrap().to_string()
    }

    #[test]
    fn test_interval_rendering() {
        assert_eq!(interval(0, 1, 0), "1 day");
        assert_eq!(interval(0, 0, 0), "00:00:00");
        assert_eq!(
            interval(14, 3, ((4 * 3600 + 5 * 60 + 6) * 1_000_000) + 500_000),
            "1 year 2 mons 3 days 04:05:06.5"
        );
        assert_eq!(interval(0, -1, 3_600_000_000), "-1 days +01:00:00");
        assert_eq!(interval(0, 0, -90_000_000), "-00:01:30");
        assert_eq!(interval(0, 0, 100 * 3_600_000_000), "100:00:00");
    }

    fn inet(ty: &Type, addr: [u8; 4], netmask: u8) -> String {
        let mut raw = vec![2, netmask, u8::from(*ty == Type::CIDR), 4];
        raw.extend_from_slice(&addr);
        PgInet::from_sql(ty, &raw).unwrap().to_string()
    }

    #[test]
    fn test_inet_rendering() {
        assert_eq!(inet(&Type::INET, [10, 0, 0, 1], 32), "10.0.0.1");
        assert_eq!(inet(&Type::INET, [192, 168, 1, 5], 24), "192.168.1.5/24");
        assert_eq!(inet(&Type::CIDR, [10, 0, 0, 0], 8), "10.0.0.0/8");
        assert_eq!(inet(&Type::CIDR, [10, 0, 0, 1], 32), "10.0.0.1/32");
    }
}
