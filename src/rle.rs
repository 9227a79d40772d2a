//! PackBits scanline decompression.
//!
//! PSD compresses each scanline of each channel independently. A control byte `n` is followed either by `n + 1`
//! literal bytes (`n >= 0`) or by a single byte repeated `1 - n` times (`n < 0`). That makes `-128` a run of 129.

use crate::error::RleError;

/// Expands one compressed scanline into `out`, which must be exactly the scanline's width.
///
/// Fails if the control stream is cut short, or if it expands to anything other than `out.len()` bytes.
pub fn decode_rle_into(input : &[u8], out : &mut [u8]) -> Result<(), RleError>
{
    let width = out.len();
    let mut i = 0;
    let mut o = 0;
    while i < input.len()
    {
        let n = input[i] as i8;
        i += 1;
        if n >= 0
        {
            let count = n as usize + 1;
            let literal = input.get(i..i + count).ok_or(RleError::Truncated)?;
            out.get_mut(o..o + count).ok_or(RleError::Overrun { width })?.copy_from_slice(literal);
            i += count;
            o += count;
        }
        else
        {
            let count = (1 - n as i32) as usize;
            let value = *input.get(i).ok_or(RleError::Truncated)?;
            i += 1;
            out.get_mut(o..o + count).ok_or(RleError::Overrun { width })?.fill(value);
            o += count;
        }
    }
    if o != width
    {
        return Err(RleError::LengthMismatch { expected : width, actual : o });
    }
    Ok(())
}

/// Expands one compressed scanline into a new vec of `width` bytes.
pub fn decode_rle(input : &[u8], width : usize) -> Result<Vec<u8>, RleError>
{
    let mut out = vec![0; width];
    decode_rle_into(input, &mut out)?;
    Ok(out)
}

#[cfg(test)]
pub (crate) fn encode_packbits(row : &[u8]) -> Vec<u8>
{
    // Simple greedy encoder: runs of 3+ become repeat packets, everything else literal packets of up to 128.
    let mut out = vec!();
    let mut i = 0;
    let mut literal_start = 0;
    let flush = |out : &mut Vec<u8>, lit : &[u8]|
    {
        for chunk in lit.chunks(128)
        {
            out.push((chunk.len() - 1) as u8);
            out.extend_from_slice(chunk);
        }
    };
    while i < row.len()
    {
        let mut run = 1;
        while i + run < row.len() && row[i + run] == row[i] && run < 128
        {
            run += 1;
        }
        if run >= 3
        {
            flush(&mut out, &row[literal_start..i]);
            out.push((1 - run as i32) as i8 as u8);
            out.push(row[i]);
            i += run;
            literal_start = i;
        }
        else
        {
            i += run;
        }
    }
    flush(&mut out, &row[literal_start..]);
    out
}
