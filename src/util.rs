/// Dump up to `limit` bytes of `data` as rows of sixteen, addressed from
/// `origin`. Operator-facing output for the loaders' verbose path.
pub fn hexdump(data: &[u8], origin: Option<u16>, limit: Option<usize>) {
    let origin = origin.unwrap_or(0) as usize;
    let shown = &data[..limit.unwrap_or(data.len()).min(data.len())];
    if shown.is_empty() {
        return;
    }

    println!("hexdump: {:04X} - {:04X}", origin, origin + shown.len() - 1);

    for (row, chunk) in shown.chunks(16).enumerate() {
        let hex = chunk
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii: String = chunk
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();
        println!("{:04X}: {:<47}  | {}", origin + row * 16, hex, ascii);
    }
}
