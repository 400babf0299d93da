//! Storage-id derivation.
//!
//! A tenant's isolated store is named by a deterministic function of its
//! display name. The function is pure and total: any string maps to a
//! bounded identifier-safe name, so it can be called before any I/O and
//! its output used directly as a store file name.

/// Longest slug kept from the display name, before the suffix.
const MAX_SLUG_LEN: usize = 32;

/// Fixed tag appended to every derived id.
const STORE_SUFFIX: &str = "_db";

/// Derive the canonical storage id for a tenant display name.
///
/// Lowercases, collapses each run of non-alphanumeric characters to a
/// single `_`, trims separators from both ends and caps the slug length.
/// Distinct display names can collide ("Acme Corp" and "Acme-Corp");
/// registration re-checks for that before inserting.
pub fn derive_storage_id(display_name: &str) -> String {
    let mut slug = String::with_capacity(display_name.len().min(MAX_SLUG_LEN));
    let mut pending_sep = false;

    for ch in display_name.chars() {
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
                if slug.len() >= MAX_SLUG_LEN {
                    break;
                }
            }
            pending_sep = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("tenant");
    }

    format!("{slug}{STORE_SUFFIX}")
}
