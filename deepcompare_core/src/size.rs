const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// Format a byte count in whole binary units, e.g. `3 MiB`.
///
/// A unit is only used once the value is strictly above it, so exactly
/// 1024 bytes prints as `1024 B`. Nothing above TiB.
pub fn format_size(bytes: u64) -> String {
    if bytes > TIB {
        format!("{} TiB", bytes / TIB)
    } else if bytes > GIB {
        format!("{} GiB", bytes / GIB)
    } else if bytes > MIB {
        format!("{} MiB", bytes / MIB)
    } else if bytes > KIB {
        format!("{} KiB", bytes / KIB)
    } else {
        format!("{} B", bytes)
    }
}
