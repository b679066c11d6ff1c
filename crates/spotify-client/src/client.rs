//! Authorized Spotify client
//!
//! The client owns one `ClientCredentials` record, one `UserCredentials`
//! record and a `Caller` tag naming which of the two authorizes outbound
//! requests. Transitions:
//!
//! - construction → `Caller::None`
//! - successful client-credentials exchange → `Caller::Client`
//! - `set_user_creds` / `build_user_credentials` → `Caller::User`
//!
//! `send_authorized` is the single path for resource requests. It refreshes
//! the active caller's token before sending if the token is known to be
//! expired, and refreshes and resends exactly once when the API answers 401
//! "The access token expired". Every other failure is returned as-is.
//!
//! All session state sits behind one async mutex held across
//! "check expiry → refresh → update", so concurrent requests racing on the
//! same expired token trigger a single refresh.

use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde_json::Value;
use spotify_auth::{
    ApiRequest, ClientCredentials, Error, ErrorDetail, RequestInfo, Result, Transport,
    UserCredentials, bearer_authorization, build_authorization_url, token,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::metrics::{record_refresh, record_request};

/// Which credential record authorizes outbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    None,
    Client,
    User,
}

impl Caller {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Caller::None => "none",
            Caller::Client => "client",
            Caller::User => "user",
        }
    }
}

/// Options for [`Client::build_user_credentials`].
#[derive(Debug, Clone, Copy)]
pub struct BuildUserOptions {
    /// Store the result on the client and make the user the active caller
    pub set_user_creds: bool,
    /// Merge into the stored record instead of replacing it
    pub update_user_creds: bool,
    /// Resolve the user id through `/me`
    pub fetch_user_id: bool,
}

impl Default for BuildUserOptions {
    fn default() -> Self {
        Self {
            set_user_creds: true,
            update_user_creds: true,
            fetch_user_id: true,
        }
    }
}

struct Session {
    client_creds: ClientCredentials,
    user_creds: UserCredentials,
    caller: Caller,
}

impl Session {
    fn access_is_expired(&self) -> Option<bool> {
        match self.caller {
            Caller::None => None,
            Caller::Client => self.client_creds.access_is_expired(),
            Caller::User => self.user_creds.access_is_expired(),
        }
    }

    fn bearer(&self) -> Result<HeaderValue> {
        let token = match self.caller {
            Caller::None => {
                return Err(Error::api(
                    "call requires an authorized caller, either client or user",
                ));
            }
            Caller::Client => self.client_creds.access_token(),
            Caller::User => self.user_creds.access_token(),
        };
        let token = token.ok_or_else(|| {
            Error::auth(format!(
                "active {} caller has no access token",
                self.caller.label()
            ))
        })?;
        bearer_authorization(token)
    }
}

pub struct Client {
    transport: Transport,
    config: ClientConfig,
    token_url: String,
    authorize_url: String,
    session: Mutex<Session>,
}

impl Client {
    /// Client with no active caller and an empty user record.
    pub fn new(client_creds: ClientCredentials, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = Transport::new(&config.transport()?)?;
        Ok(Self {
            transport,
            token_url: config.token_url(),
            authorize_url: config.authorize_url(),
            config,
            session: Mutex::new(Session {
                client_creds,
                user_creds: UserCredentials::new(),
                caller: Caller::None,
            }),
        })
    }

    /// Client whose active caller is `user_creds`. With `ensure_user_auth`
    /// the credentials are probed and construction fails if they're rejected.
    pub async fn with_user_creds(
        client_creds: ClientCredentials,
        user_creds: UserCredentials,
        config: ClientConfig,
    ) -> Result<Self> {
        let client = Self::new(client_creds, config)?;
        client.set_user_creds(user_creds).await?;
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn caller(&self) -> Caller {
        self.session.lock().await.caller
    }

    pub async fn client_creds(&self) -> ClientCredentials {
        self.session.lock().await.client_creds.clone()
    }

    pub async fn user_creds(&self) -> UserCredentials {
        self.session.lock().await.user_creds.clone()
    }

    /// Replace the user record and make it the active caller.
    pub async fn set_user_creds(&self, user_creds: UserCredentials) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            session.user_creds = user_creds;
            session.caller = Caller::User;
        }
        info!(caller = "user", "user credentials set");
        if self.config.ensure_user_auth {
            self.check_authorization().await?;
        }
        Ok(())
    }

    /// Replace the user record without touching the active caller. Used to
    /// resume a pending authorization whose `state` was persisted.
    pub async fn restore_user_creds(&self, user_creds: UserCredentials) {
        self.session.lock().await.user_creds = user_creds;
    }

    pub async fn is_oauth_ready(&self) -> bool {
        self.session.lock().await.client_creds.is_oauth_ready()
    }

    /// Authorization URL for the code flow, carrying the user record's CSRF
    /// state unless state checking is disabled.
    pub async fn oauth_uri(&self) -> Result<String> {
        let session = self.session.lock().await;
        let state = if self.config.enforce_state_check {
            let state = session.user_creds.state();
            if state.is_none() {
                warn!("no user state available, building authorization URL without a state");
            }
            state
        } else {
            None
        };
        build_authorization_url(&self.authorize_url, &session.client_creds, state)
    }

    /// Run the client-credentials grant, make the client the active caller,
    /// then verify the new token against the API.
    ///
    /// `client_creds`, if given, replaces the stored record first.
    pub async fn authorize_client_creds(
        &self,
        client_creds: Option<ClientCredentials>,
    ) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            if let Some(client_creds) = client_creds {
                if session.client_creds.client_id.is_some() {
                    warn!("overwriting existing client credentials");
                }
                session.client_creds = client_creds;
            }
            self.exchange_client_token(&mut session).await?;
        }
        info!(caller = "client", "client credentials authorized");
        self.check_authorization()
            .await
            .map_err(|e| e.into_authentication("client credentials were not accepted"))
    }

    /// Complete the authorization-code flow with the `code` from the
    /// redirect.
    ///
    /// If `state` is given it must equal the stored user record's state;
    /// otherwise this fails before any network call.
    pub async fn build_user_credentials(
        &self,
        code: &str,
        state: Option<&str>,
        options: BuildUserOptions,
    ) -> Result<UserCredentials> {
        let client_creds = {
            let session = self.session.lock().await;
            if let Some(state) = state
                && session.user_creds.state() != Some(state)
            {
                return Err(Error::Authentication(Box::new(
                    ErrorDetail::new("states do not match or state not provided").with_status(401),
                )));
            }
            session.client_creds.clone()
        };

        let response =
            token::request_user_token(&self.transport, &self.token_url, &client_creds, code)
                .await?;
        let access_token = response.access_token.clone();
        let mut user_creds = response.into_user_credentials();

        if options.fetch_user_id {
            user_creds.user_id = Some(self.request_user_id(&access_token).await?);
        }
        if !options.set_user_creds {
            return Ok(user_creds);
        }

        let mut session = self.session.lock().await;
        if options.update_user_creds {
            session.user_creds.merge(user_creds);
        } else {
            user_creds.state = session.user_creds.state.take();
            session.user_creds = user_creds;
        }
        session.caller = Caller::User;
        info!(caller = "user", "user credentials built");
        Ok(session.user_creds.clone())
    }

    /// The user's Spotify id, fetched from `/me` on first use and cached.
    /// `None` if the user record has neither an id nor an access token.
    pub async fn user_id(&self) -> Result<Option<String>> {
        let access_token = {
            let session = self.session.lock().await;
            if let Some(id) = &session.user_creds.user_id {
                return Ok(Some(id.clone()));
            }
            match session.user_creds.access_token() {
                Some(token) => token.to_owned(),
                None => return Ok(None),
            }
        };

        let id = self.request_user_id(&access_token).await?;
        let mut session = self.session.lock().await;
        Ok(Some(session.user_creds.user_id.get_or_insert(id).clone()))
    }

    /// Whether the active caller's credentials are accepted by the API.
    ///
    /// Authentication failures become `Ok(false)`; other failures (timeouts,
    /// server errors) are returned.
    pub async fn is_active(&self) -> Result<bool> {
        if self.caller().await == Caller::None {
            return Ok(false);
        }
        match self.check_authorization().await {
            Ok(()) => Ok(true),
            Err(e) if e.is_authentication() => {
                debug!(error = %e, "credentials not accepted");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// GET a resource path relative to the API base URL and parse the JSON
    /// body. Query pairs with empty values are dropped.
    pub async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let request = ApiRequest::get(self.api_url(path, query)?);
        let info = request.info();
        let response = self.send_authorized(request).await?;
        read_json(response, info).await
    }

    /// Profile of the current user.
    pub async fn me(&self) -> Result<Value> {
        self.get_json("/me", &[]).await
    }

    /// Send `request` on behalf of the active caller.
    ///
    /// 1. Refresh first if the caller's token is known to be expired.
    /// 2. Attach `Authorization: Bearer <token>` and send.
    /// 3. On 401 "The access token expired": refresh, require a different
    ///    bearer header, and resend once. The resend's outcome is final.
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn send_authorized(&self, mut request: ApiRequest) -> Result<reqwest::Response> {
        let bearer = {
            let mut session = self.session.lock().await;
            if session.access_is_expired() == Some(true) {
                debug!(
                    caller = session.caller.label(),
                    "access token expired, refreshing before send"
                );
                self.refresh_token(&mut session).await?;
            }
            session.bearer()?
        };

        request.headers.insert(AUTHORIZATION, bearer.clone());
        match self.send_recorded(&request).await {
            Err(e) if e.is_token_expired() => {
                let fresh = {
                    let mut session = self.session.lock().await;
                    // Another request may already have refreshed this token
                    if session.bearer()? == bearer {
                        debug!(
                            caller = session.caller.label(),
                            "API reported expired token, refreshing"
                        );
                        self.refresh_token(&mut session).await?;
                    }
                    session.bearer()?
                };
                if fresh == bearer {
                    return Err(Error::Authentication(Box::new(
                        ErrorDetail::new("token refresh did not produce a new access token")
                            .with_status(401)
                            .with_request(request.info()),
                    )));
                }
                request.headers.insert(AUTHORIZATION, fresh);
                self.send_recorded(&request).await
            }
            other => other,
        }
    }

    /// Probe that needs authorization but no scope.
    async fn check_authorization(&self) -> Result<()> {
        let url = self.api_url(
            "/search",
            &[("q", "Hey spotify am I authorized"), ("type", "artist")],
        )?;
        self.send_authorized(ApiRequest::get(url)).await?;
        Ok(())
    }

    /// Refresh the active caller's token in place.
    async fn refresh_token(&self, session: &mut Session) -> Result<()> {
        let caller = session.caller;
        let result = match caller {
            Caller::None => Err(Error::auth("no caller to refresh token for")),
            Caller::Client => self.exchange_client_token(session).await,
            Caller::User => self.refresh_user_token(session).await,
        };
        record_refresh(caller.label(), result.is_ok());
        result
    }

    async fn refresh_user_token(&self, session: &mut Session) -> Result<()> {
        let refresh_token = session
            .user_creds
            .refresh_token()
            .ok_or_else(|| {
                Error::auth("access token expired and there is no refresh token to refresh it")
            })?
            .to_owned();
        let response = token::refresh_user_token(
            &self.transport,
            &self.token_url,
            &session.client_creds,
            &refresh_token,
        )
        .await?;
        session.user_creds.merge(response.into_user_credentials());
        Ok(())
    }

    async fn exchange_client_token(&self, session: &mut Session) -> Result<()> {
        let response =
            token::request_client_token(&self.transport, &self.token_url, &session.client_creds)
                .await?;
        session.client_creds.merge(response.into_client_credentials());
        session.caller = Caller::Client;
        Ok(())
    }

    /// `/me` lookup with an explicit token, bypassing the active caller.
    async fn request_user_id(&self, access_token: &str) -> Result<String> {
        let request = ApiRequest::get(self.api_url("/me", &[])?)
            .header(AUTHORIZATION, bearer_authorization(access_token)?);
        let info = request.info();
        let body = read_json(self.transport.send(&request).await?, info).await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::api("/me response has no user id"))
    }

    async fn send_recorded(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let result = self.transport.send(request).await;
        let status = match &result {
            Ok(response) => response.status().as_u16(),
            Err(e) => e.status().unwrap_or(0),
        };
        record_request(status, request.method.as_str());
        result
    }

    fn api_url(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let url = format!("{}{path}", self.config.api_base_url.trim_end_matches('/'));
        let params: Vec<_> = query.iter().filter(|(_, value)| !value.is_empty()).collect();
        let parsed = if params.is_empty() {
            reqwest::Url::parse(&url)
        } else {
            reqwest::Url::parse_with_params(&url, params)
        };
        parsed
            .map(|u| u.to_string())
            .map_err(|e| Error::Config(format!("invalid API URL {url}: {e}")))
    }
}

async fn read_json(response: reqwest::Response, request: RequestInfo) -> Result<Value> {
    response.json::<Value>().await.map_err(|e| {
        Error::Api(Box::new(
            ErrorDetail::new("response body is not valid JSON")
                .with_request(request)
                .with_source(e),
        ))
    })
}
