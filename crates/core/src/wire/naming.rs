//! Field-name casing between the domain (`snake_case`) and the wire (`camelCase`).
//!
//! Both directions split on a casing boundary and rejoin with the other
//! convention. Names where a digit sits next to a word boundary are not
//! reversible: `address_line_2` encodes to `addressLine2`, which decodes to
//! `address_line2`. Domain records avoid such names.

/// `client_id` -> `clientId`.
pub fn to_wire_case(domain_name: &str) -> String {
    let mut output = String::with_capacity(domain_name.len());
    let mut upper_next = false;

    for ch in domain_name.chars() {
        if ch == '_' {
            upper_next = !output.is_empty();
            continue;
        }

        if upper_next {
            output.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            output.push(ch);
        }
    }

    output
}

/// `clientId` -> `client_id`.
pub fn to_domain_case(wire_name: &str) -> String {
    let mut output = String::with_capacity(wire_name.len() + 4);

    for ch in wire_name.chars() {
        if ch.is_uppercase() {
            if !output.is_empty() {
                output.push('_');
            }
            output.extend(ch.to_lowercase());
        } else {
            output.push(ch);
        }
    }

    output
}
