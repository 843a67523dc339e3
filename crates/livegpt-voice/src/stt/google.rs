//! Google Cloud Speech `StreamingRecognize` client.
//!
//! The RPC is called directly through `tonic::client::Grpc` with a
//! hand-written subset of the `google.cloud.speech.v1` messages; the
//! handful of fields this service uses has been wire-stable for years
//! and does not justify vendored protos plus build-time codegen.

use std::sync::Arc;

use bytes::Bytes;
use http::uri::PathAndQuery;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, ClientTlsConfig};
use tonic::{Code, Request, Status};
use tracing::debug;

use crate::auth::TokenProvider;
use crate::error::VoiceError;
use crate::stt::{SessionConfig, SttClient, SttResponse, SttResult, SttSession};

const ENDPOINT: &str = "https://speech.googleapis.com";
const STREAMING_RECOGNIZE: &str = "/google.cloud.speech.v1.Speech/StreamingRecognize";

/// Wire messages for the subset of `google.cloud.speech.v1` in use.
pub mod proto {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StreamingRecognizeRequest {
        #[prost(oneof = "streaming_request::Payload", tags = "1, 2")]
        pub streaming_request: Option<streaming_request::Payload>,
    }

    pub mod streaming_request {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Payload {
            #[prost(message, tag = "1")]
            StreamingConfig(super::StreamingRecognitionConfig),
            #[prost(bytes = "vec", tag = "2")]
            AudioContent(Vec<u8>),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StreamingRecognitionConfig {
        #[prost(message, optional, tag = "1")]
        pub config: Option<RecognitionConfig>,
        #[prost(bool, tag = "2")]
        pub single_utterance: bool,
        #[prost(bool, tag = "3")]
        pub interim_results: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RecognitionConfig {
        #[prost(enumeration = "AudioEncoding", tag = "1")]
        pub encoding: i32,
        #[prost(int32, tag = "2")]
        pub sample_rate_hertz: i32,
        #[prost(string, tag = "3")]
        pub language_code: String,
        #[prost(message, repeated, tag = "6")]
        pub speech_contexts: Vec<SpeechContext>,
        #[prost(int32, tag = "7")]
        pub audio_channel_count: i32,
        #[prost(string, tag = "13")]
        pub model: String,
        #[prost(bool, tag = "14")]
        pub use_enhanced: bool,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum AudioEncoding {
        Unspecified = 0,
        Linear16 = 1,
        Flac = 2,
        Mulaw = 3,
        Amr = 4,
        AmrWb = 5,
        OggOpus = 6,
        SpeexWithHeaderByte = 7,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SpeechContext {
        #[prost(string, repeated, tag = "1")]
        pub phrases: Vec<String>,
        #[prost(float, tag = "4")]
        pub boost: f32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StreamingRecognizeResponse {
        #[prost(message, optional, tag = "1")]
        pub error: Option<RpcStatus>,
        #[prost(message, repeated, tag = "2")]
        pub results: Vec<StreamingRecognitionResult>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StreamingRecognitionResult {
        #[prost(message, repeated, tag = "1")]
        pub alternatives: Vec<SpeechRecognitionAlternative>,
        #[prost(bool, tag = "2")]
        pub is_final: bool,
        #[prost(float, tag = "3")]
        pub stability: f32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SpeechRecognitionAlternative {
        #[prost(string, tag = "1")]
        pub transcript: String,
        #[prost(float, tag = "2")]
        pub confidence: f32,
    }

    /// `google.rpc.Status` without the `details` payload.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RpcStatus {
        #[prost(int32, tag = "1")]
        pub code: i32,
        #[prost(string, tag = "2")]
        pub message: String,
    }
}

use proto::streaming_request::Payload;

/// Client for the streaming recognition endpoint. Cheap to clone via the
/// shared channel; one instance serves every agent in the process.
pub struct GoogleSttClient {
    channel: Channel,
    auth: Arc<TokenProvider>,
}

impl GoogleSttClient {
    /// Builds the client against the public endpoint. The underlying
    /// connection is established lazily on the first session.
    pub fn new(auth: Arc<TokenProvider>) -> Result<Self, VoiceError> {
        let tls = ClientTlsConfig::new().with_native_roots();
        let channel = Channel::from_static(ENDPOINT)
            .tls_config(tls)
            .map_err(|e| VoiceError::Stt(format!("tls configuration: {e}")))?
            .connect_lazy();
        Ok(Self { channel, auth })
    }
}

#[async_trait::async_trait]
impl SttClient for GoogleSttClient {
    async fn open(&self, config: SessionConfig) -> Result<SttSession, VoiceError> {
        let bearer = self.auth.bearer().await?;

        let (request_tx, request_rx) = mpsc::channel::<proto::StreamingRecognizeRequest>(32);
        request_tx
            .send(initial_request(&config))
            .await
            .expect("channel has capacity for the config message");

        // Bridge raw OGG bytes into audio-content requests; dropping the
        // audio sender half-closes the RPC.
        let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(64);
        tokio::spawn(async move {
            while let Some(chunk) = audio_rx.recv().await {
                let request = proto::StreamingRecognizeRequest {
                    streaming_request: Some(Payload::AudioContent(chunk.to_vec())),
                };
                if request_tx.send(request).await.is_err() {
                    break;
                }
            }
        });

        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| VoiceError::Stt(format!("speech service not ready: {e}")))?;

        let mut request = Request::new(ReceiverStream::new(request_rx));
        let header = MetadataValue::try_from(bearer.as_str())
            .map_err(|e| VoiceError::Auth(format!("invalid bearer header: {e}")))?;
        request.metadata_mut().insert("authorization", header);

        let codec: ProstCodec<proto::StreamingRecognizeRequest, proto::StreamingRecognizeResponse> =
            ProstCodec::default();
        let inbound = grpc
            .streaming(request, PathAndQuery::from_static(STREAMING_RECOGNIZE), codec)
            .await
            .map_err(map_status)?;

        let mut inbound = inbound.into_inner();
        let (results_tx, results) = mpsc::channel(32);
        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(message)) => {
                        if results_tx.send(Ok(map_response(message))).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("speech stream finished");
                        break;
                    }
                    Err(status) => {
                        let _ = results_tx.send(Err(map_status(status))).await;
                        break;
                    }
                }
            }
        });

        Ok(SttSession { audio_tx, results })
    }
}

fn initial_request(config: &SessionConfig) -> proto::StreamingRecognizeRequest {
    proto::StreamingRecognizeRequest {
        streaming_request: Some(Payload::StreamingConfig(proto::StreamingRecognitionConfig {
            config: Some(proto::RecognitionConfig {
                encoding: proto::AudioEncoding::OggOpus as i32,
                sample_rate_hertz: config.sample_rate as i32,
                language_code: config.language_code.clone(),
                speech_contexts: vec![proto::SpeechContext {
                    phrases: config.boost_phrases.clone(),
                    boost: config.boost,
                }],
                audio_channel_count: i32::from(config.channels),
                model: config.model.clone(),
                use_enhanced: config.use_enhanced,
            }),
            single_utterance: true,
            interim_results: config.interim_results,
        })),
    }
}

fn map_response(message: proto::StreamingRecognizeResponse) -> SttResponse {
    SttResponse {
        error: message
            .error
            .map(|status| format!("recognition error {}: {}", status.code, status.message)),
        results: message
            .results
            .into_iter()
            .map(|result| SttResult {
                alternatives: result
                    .alternatives
                    .into_iter()
                    .map(|alt| alt.transcript)
                    .collect(),
                is_final: result.is_final,
            })
            .collect(),
    }
}

fn map_status(status: Status) -> VoiceError {
    match status.code() {
        Code::OutOfRange => VoiceError::DeadlineExceeded,
        Code::Cancelled => VoiceError::Cancelled,
        code => VoiceError::Stt(format!("{code:?}: {}", status.message())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livegpt_types::DEFAULT_LANGUAGE;

    #[test]
    fn initial_request_carries_session_config() {
        let config = SessionConfig::for_track(48_000, 1, DEFAULT_LANGUAGE);
        let request = initial_request(&config);

        let Some(Payload::StreamingConfig(streaming)) = request.streaming_request else {
            panic!("expected a streaming config payload");
        };
        assert!(streaming.interim_results);
        assert!(streaming.single_utterance);

        let recognition = streaming.config.unwrap();
        assert_eq!(recognition.encoding, proto::AudioEncoding::OggOpus as i32);
        assert_eq!(recognition.sample_rate_hertz, 48_000);
        assert_eq!(recognition.audio_channel_count, 1);
        assert_eq!(recognition.language_code, "en-US");
        assert!(recognition.use_enhanced);
        assert!(!recognition.speech_contexts[0].phrases.is_empty());
    }

    #[test]
    fn response_mapping_flattens_alternatives() {
        let message = proto::StreamingRecognizeResponse {
            error: None,
            results: vec![proto::StreamingRecognitionResult {
                alternatives: vec![
                    proto::SpeechRecognitionAlternative {
                        transcript: "hello world".into(),
                        confidence: 0.9,
                    },
                    proto::SpeechRecognitionAlternative {
                        transcript: "yellow whirled".into(),
                        confidence: 0.1,
                    },
                ],
                is_final: true,
                stability: 0.0,
            }],
        };

        let mapped = map_response(message);
        assert!(mapped.error.is_none());
        assert_eq!(mapped.results.len(), 1);
        assert!(mapped.results[0].is_final);
        assert_eq!(mapped.results[0].alternatives[0], "hello world");
    }

    #[test]
    fn embedded_errors_survive_mapping() {
        let message = proto::StreamingRecognizeResponse {
            error: Some(proto::RpcStatus {
                code: 11,
                message: "audio timeout".into(),
            }),
            results: vec![],
        };
        let mapped = map_response(message);
        assert!(mapped.error.as_deref().unwrap().contains("audio timeout"));
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(
            map_status(Status::out_of_range("deadline")),
            VoiceError::DeadlineExceeded
        ));
        assert!(matches!(
            map_status(Status::cancelled("bye")),
            VoiceError::Cancelled
        ));
        assert!(matches!(
            map_status(Status::unavailable("overloaded")),
            VoiceError::Stt(_)
        ));
    }
}
