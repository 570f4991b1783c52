use lsp_types::Diagnostic;
use lsp_types::DiagnosticSeverity;
use lsp_types::NumberOrString;
use lsp_types::Range;
use std::sync::mpsc::channel;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::Sender;

pub struct DiagnosticLog {
  recv: Receiver<Diagnostic>,
  send: Sender<Diagnostic>,
}

impl DiagnosticLog {
  pub fn new() -> Self {
    let (send, recv) = channel();
    DiagnosticLog { recv, send }
  }

  pub fn get_logger(&mut self, source: Option<String>) -> DiagnosticLogger {
    DiagnosticLogger {
      sender: self.send.clone(),
      source,
    }
  }

  // drains every diagnostic logged so far
  pub fn take(&mut self) -> Vec<Diagnostic> {
    self.recv.try_iter().collect()
  }
}

impl Default for DiagnosticLog {
  fn default() -> Self {
    Self::new()
  }
}

pub struct DiagnosticLogger {
  sender: Sender<Diagnostic>,
  source: Option<String>,
}

impl DiagnosticLogger {
  pub fn log_unexpected_eof_in_string(&mut self, range: Range) {
    self.log(Diagnostic {
      range,
      severity: Some(DiagnosticSeverity::ERROR),
      code: Some(NumberOrString::Number(1)),
      code_description: None,
      source: self.source.clone(),
      message: "unexpected end of file in string, expected close quote".to_owned(),
      related_information: None,
      tags: None,
      data: None,
    })
  }

  pub fn log_malformed_codepoint(&mut self, range: Range) {
    self.log(Diagnostic {
      range,
      severity: Some(DiagnosticSeverity::ERROR),
      code: Some(NumberOrString::Number(2)),
      code_description: None,
      source: self.source.clone(),
      message: "malformed UTF-8 sequence, remainder of input ignored".to_owned(),
      related_information: None,
      tags: None,
      data: None,
    })
  }

  pub fn log_unrecognized_character(&mut self, range: Range, character: char) {
    self.log(Diagnostic {
      range,
      severity: Some(DiagnosticSeverity::ERROR),
      code: Some(NumberOrString::Number(3)),
      code_description: None,
      source: self.source.clone(),
      message: format!("unrecognized character: `{}`", character),
      related_information: None,
      tags: None,
      data: None,
    })
  }

  pub fn log_unmatched_raw_string_opener(&mut self, range: Range) {
    self.log(Diagnostic {
      range,
      severity: Some(DiagnosticSeverity::ERROR),
      code: Some(NumberOrString::Number(4)),
      code_description: None,
      source: self.source.clone(),
      message: "raw string opener without a following `\"`".to_owned(),
      related_information: None,
      tags: None,
      data: None,
    })
  }

  pub fn log_type_mismatch(&mut self, range: Range, left: &[u8], right: &[u8]) {
    self.log(Diagnostic {
      range,
      severity: Some(DiagnosticSeverity::ERROR),
      code: Some(NumberOrString::Number(5)),
      code_description: None,
      source: self.source.clone(),
      message: format!(
        "type mismatch between `{}` and `{}`",
        String::from_utf8_lossy(left),
        String::from_utf8_lossy(right)
      ),
      related_information: None,
      tags: None,
      data: None,
    })
  }

  fn log(&mut self, d: Diagnostic) {
    self.sender.send(d).unwrap()
  }
}
