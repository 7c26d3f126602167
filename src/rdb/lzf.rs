//! Распаковка LZF.
//!
//! Управляющий байт `ctrl < 32` означает литерал длиной `ctrl + 1`, иначе —
//! обратную ссылку: длина `ctrl >> 5` (7 — продолжение в следующем байте)
//! плюс 2, смещение `((ctrl & 0x1F) << 8 | next) + 1` назад от конца вывода.

use cutover_error::{CutoverResult, RdbError};

/// Распаковывает `input` и проверяет, что результат ровно `expected_len`
/// байт.
pub fn decompress(
    input: &[u8],
    expected_len: usize,
) -> CutoverResult<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_len.min(input.len().saturating_mul(8)));
    let mut ip = 0;

    while ip < input.len() {
        let ctrl = usize::from(input[ip]);
        ip += 1;

        if ctrl < 32 {
            let count = ctrl + 1;
            if ip + count > input.len() {
                return Err(corrupted("literal run past end of input"));
            }
            output.extend_from_slice(&input[ip..ip + count]);
            ip += count;
        } else {
            let mut len = ctrl >> 5;
            if len == 7 {
                let Some(&extra) = input.get(ip) else {
                    return Err(corrupted("missing extended back-reference length"));
                };
                len += usize::from(extra);
                ip += 1;
            }
            len += 2;

            let Some(&low) = input.get(ip) else {
                return Err(corrupted("missing back-reference offset"));
            };
            ip += 1;
            let offset = ((ctrl & 0x1F) << 8) | usize::from(low);

            let start = output
                .len()
                .checked_sub(offset + 1)
                .ok_or_else(|| corrupted("back-reference before start of output"))?;

            // перекрывающееся копирование даёт повтор (RLE)
            for i in 0..len {
                let byte = output[start + i];
                output.push(byte);
            }
        }

        if output.len() > expected_len {
            break;
        }
    }

    if output.len() != expected_len {
        return Err(RdbError::ChecksumOrLengthMismatch {
            expected: expected_len as u64,
            got: output.len() as u64,
        }
        .into());
    }

    Ok(output)
}

fn corrupted(reason: &str) -> cutover_error::StackError {
    RdbError::CompressionError {
        reason: reason.to_string(),
    }
    .into()
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
