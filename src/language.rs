//! Session languages and the phrases the controller speaks on its own
//!
//! Everything else the kiosk says comes from the backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Language of the current session, carried in every outbound intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "ko")]
    Korean,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "zh")]
    Chinese,
}

/// Voice parameters handed to the speech synthesizer
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    /// BCP 47 voice tag (e.g., "ko-KR")
    pub language_tag: &'static str,
    pub rate: f32,
    pub pitch: f32,
}

impl Language {
    /// Short code used on the wire
    pub fn code(self) -> &'static str {
        match self {
            Self::Korean => "ko",
            Self::English => "en",
            Self::Japanese => "ja",
            Self::Chinese => "zh",
        }
    }

    pub fn voice(self) -> VoiceParams {
        let language_tag = match self {
            Self::Korean => "ko-KR",
            Self::English => "en-US",
            Self::Japanese => "ja-JP",
            Self::Chinese => "zh-CN",
        };

        VoiceParams {
            language_tag,
            rate: 0.9,
            pitch: 1.0,
        }
    }

    pub fn phrases(self) -> &'static Phrases {
        match self {
            Self::Korean => &KOREAN,
            Self::English => &ENGLISH,
            Self::Japanese => &JAPANESE,
            Self::Chinese => &CHINESE,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ko" | "ko-kr" => Ok(Self::Korean),
            "en" | "en-us" => Ok(Self::English),
            "ja" | "ja-jp" => Ok(Self::Japanese),
            "zh" | "zh-cn" => Ok(Self::Chinese),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

/// Fixed utterances spoken or logged locally
#[derive(Debug)]
pub struct Phrases {
    greeting_suffix: &'static str,
    greeting_prefix: &'static str,
    pub cancelled: &'static str,
    pub confirm_yes: &'static str,
    pub confirm_no: &'static str,
    pub sos_prompt: &'static str,
    pub sos_cancelled: &'static str,
    pub sos_sent: &'static str,
    pub sos_notice: &'static str,
    pub stop_ack: &'static str,
    pub stop_notice: &'static str,
}

impl Phrases {
    /// Greeting spoken once authentication succeeds
    pub fn greeting(&self, name: &str) -> String {
        format!("{}{}{}", self.greeting_prefix, name, self.greeting_suffix)
    }
}

static KOREAN: Phrases = Phrases {
    greeting_prefix: "",
    greeting_suffix: "님, 무엇을 도와드릴까요?",
    cancelled: "취소했습니다.",
    confirm_yes: "네, 해주세요.",
    confirm_no: "아니요.",
    sos_prompt: "긴급 호출을 하시겠습니까?",
    sos_cancelled: "취소되었습니다.",
    sos_sent: "긴급 호출이 발송되었습니다.",
    sos_notice: "🚨 긴급 호출이 발송되었습니다.",
    stop_ack: "로봇을 정지합니다.",
    stop_notice: "🛑 로봇을 비상 정지시켰습니다.",
};

static ENGLISH: Phrases = Phrases {
    greeting_prefix: "Hello ",
    greeting_suffix: ", how can I help you?",
    cancelled: "Cancelled.",
    confirm_yes: "Yes, please.",
    confirm_no: "No.",
    sos_prompt: "Do you want to send an emergency call?",
    sos_cancelled: "Cancelled.",
    sos_sent: "The emergency call has been sent.",
    sos_notice: "🚨 Emergency call sent.",
    stop_ack: "Stopping the robot.",
    stop_notice: "🛑 The robot has been stopped.",
};

static JAPANESE: Phrases = Phrases {
    greeting_prefix: "",
    greeting_suffix: "さん、何をお手伝いしましょうか？",
    cancelled: "キャンセルしました。",
    confirm_yes: "はい、お願いします。",
    confirm_no: "いいえ。",
    sos_prompt: "緊急呼び出しをしますか？",
    sos_cancelled: "キャンセルされました。",
    sos_sent: "緊急呼び出しを送信しました。",
    sos_notice: "🚨 緊急呼び出しを送信しました。",
    stop_ack: "ロボットを停止します。",
    stop_notice: "🛑 ロボットを緊急停止しました。",
};

static CHINESE: Phrases = Phrases {
    greeting_prefix: "",
    greeting_suffix: "，有什么可以帮您？",
    cancelled: "已取消。",
    confirm_yes: "好的，请执行。",
    confirm_no: "不用了。",
    sos_prompt: "要发送紧急呼叫吗？",
    sos_cancelled: "已取消。",
    sos_sent: "紧急呼叫已发送。",
    sos_notice: "🚨 紧急呼叫已发送。",
    stop_ack: "正在停止机器人。",
    stop_notice: "🛑 机器人已紧急停止。",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_korean_greeting() {
        assert_eq!(
            Language::Korean.phrases().greeting("Kim"),
            "Kim님, 무엇을 도와드릴까요?"
        );
    }

    #[test]
    fn test_language_wire_codes() {
        assert_eq!(serde_json::to_string(&Language::Korean).unwrap(), "\"ko\"");
        let lang: Language = serde_json::from_str("\"ja\"").unwrap();
        assert_eq!(lang, Language::Japanese);
        assert_eq!("EN".parse::<Language>().unwrap(), Language::English);
        assert!("xx".parse::<Language>().is_err());
    }

    #[test]
    fn test_voice_tag() {
        let voice = Language::Korean.voice();
        assert_eq!(voice.language_tag, "ko-KR");
        assert!((voice.rate - 0.9).abs() < f32::EPSILON);
    }
}
