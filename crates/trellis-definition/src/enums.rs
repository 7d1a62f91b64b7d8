use std::fmt;

use serde::{Deserialize, Serialize};

/// Domain event kinds emitted by the surrounding record system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
  RecordCreated,
  RecordUpdated,
  RecordDeleted,
  FieldChanged,
  StageChanged,
}

/// Action kinds with a registered handler.
///
/// The set is closed: an unknown `actionType` string in a definition fails
/// deserialization, so the dispatcher never sees a type it cannot route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
  SendEmail,
  SendTelegram,
  CreateTask,
  CreateNotification,
  UpdateField,
  Webhook,
  Delay,
}

impl ActionType {
  /// Config keys that must be present for this action type.
  pub fn required_keys(&self) -> &'static [&'static str] {
    match self {
      ActionType::SendEmail => &["to"],
      ActionType::SendTelegram => &["chat_id"],
      ActionType::CreateTask => &["title"],
      ActionType::CreateNotification => &["message"],
      ActionType::UpdateField => &["field"],
      ActionType::Webhook => &["url"],
      ActionType::Delay => &["duration", "unit"],
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ActionType::SendEmail => "SEND_EMAIL",
      ActionType::SendTelegram => "SEND_TELEGRAM",
      ActionType::CreateTask => "CREATE_TASK",
      ActionType::CreateNotification => "CREATE_NOTIFICATION",
      ActionType::UpdateField => "UPDATE_FIELD",
      ActionType::Webhook => "WEBHOOK",
      ActionType::Delay => "DELAY",
    }
  }
}

impl fmt::Display for ActionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Comparison operators available on condition nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
  Equals,
  NotEquals,
  Contains,
  NotContains,
  StartsWith,
  EndsWith,
  GreaterThan,
  LessThan,
  IsEmpty,
  IsNotEmpty,
}

/// How a condition clause joins the running result of the clauses before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicOp {
  And,
  Or,
}

/// Named outgoing edge slot on a branching node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Port {
  True,
  False,
  Body,
  Exit,
}

impl fmt::Display for Port {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Port::True => "true",
      Port::False => "false",
      Port::Body => "body",
      Port::Exit => "exit",
    };
    f.write_str(s)
  }
}

/// Unit of a delay action's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
  Seconds,
  Minutes,
  Hours,
  Days,
}

impl DelayUnit {
  pub fn seconds(&self) -> i64 {
    match self {
      DelayUnit::Seconds => 1,
      DelayUnit::Minutes => 60,
      DelayUnit::Hours => 3600,
      DelayUnit::Days => 86400,
    }
  }
}
