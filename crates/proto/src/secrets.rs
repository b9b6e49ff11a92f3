use std::{collections::HashMap, fmt};

/// Secret map carried by a request. Only the keys ever show up in logs.
#[derive(Default)]
pub(crate) struct Secrets(HashMap<String, String>);

impl AsRef<HashMap<String, String>> for Secrets {
  #[inline]
  fn as_ref(&self) -> &HashMap<String, String> {
    &self.0
  }
}

impl From<HashMap<String, String>> for Secrets {
  #[inline]
  fn from(v: HashMap<String, String>) -> Self {
    Secrets(v)
  }
}

impl fmt::Debug for Secrets {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut m = f.debug_map();
    for k in self.0.keys() {
      m.key(k).value(&"SECRET");
    }

    m.finish()
  }
}

#[cfg(test)]
mod tests {
  use super::Secrets;
  use std::collections::HashMap;

  #[test]
  fn debug_hides_values() {
    let mut map = HashMap::new();
    map.insert("access_key_id".to_owned(), "AKIA123".to_owned());
    let secrets = Secrets::from(map);

    let printed = format!("{:?}", secrets);
    assert!(printed.contains("access_key_id"));
    assert!(!printed.contains("AKIA123"));
    assert_eq!(
      secrets.as_ref().get("access_key_id").map(String::as_str),
      Some("AKIA123")
    );
  }
}
