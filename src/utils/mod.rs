#[cfg(test)]
pub mod testing;
