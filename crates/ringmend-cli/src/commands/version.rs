pub fn line() -> String {
    format!("ringmend version {}", env!("CARGO_PKG_VERSION"))
}

pub fn print() {
    println!("{}", line());
}

#[cfg(test)]
mod tests {
    #[test]
    fn names_the_tool() {
        assert_eq!(super::line(), format!("ringmend version {}", env!("CARGO_PKG_VERSION")));
        assert!(super::line().starts_with("ringmend version "));
    }
}
