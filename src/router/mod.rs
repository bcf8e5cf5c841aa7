//! Conversation router.
//!
//! The state machine behind the menu: each inbound message is dispatched to
//! exactly one handler keyed on the sender's session (sub-state first, then
//! flow state, then the stateless menu triggers). Handlers reply through
//! the [`ChatTransport`] and advance or clear the session; any error
//! escaping a handler is answered with the generic apology and the session
//! is cleared so a sender is never left stuck mid-flow.

pub mod replies;

use crate::channel::{ChannelMessage, ChatTransport};
use crate::config::{BotConfig, DatasetsConfig};
use crate::data::query::{all_rows, filter_by, sample};
use crate::data::Row;
use crate::error::Result;
use crate::map::StaticMapRenderer;
use crate::session::{FlowState, Session, SessionStore, SubState, EXTRA_MEDICINE};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Greeting keywords that open the menu (substring match anywhere in the
/// message).
static GREETING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(menu|dia|tarde|noite|oi|ol[aá])").expect("greeting regex"));

/// Theatres drawn per tourism request.
const THEATRE_SAMPLE: usize = 5;

/// The conversation router.
pub struct Router {
    transport: Arc<dyn ChatTransport>,
    store: Arc<SessionStore>,
    datasets: DatasetsConfig,
    renderer: StaticMapRenderer,
    marker: (f64, f64),
    typing_delay: Duration,
    /// Per-sender guards: two messages from one sender never race on the
    /// session; distinct senders proceed concurrently.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Router {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<SessionStore>,
        config: &BotConfig,
    ) -> Result<Self> {
        Ok(Self {
            transport,
            store,
            datasets: config.datasets.clone(),
            renderer: StaticMapRenderer::new(config.map.clone())?,
            marker: (config.map.center_lat, config.map.center_lon),
            typing_delay: Duration::from_millis(config.gateway.typing_delay_ms),
            locks: DashMap::new(),
        })
    }

    /// Handle one inbound message, serialized per sender.
    pub async fn handle(&self, msg: &ChannelMessage) {
        let lock = self
            .locks
            .entry(msg.sender.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        if let Err(e) = self.dispatch(msg).await {
            tracing::error!(sender = %msg.sender, error = %e, "handler failed");
            self.store.clear(&msg.sender);
            if let Err(e) = self.transport.send_text(&msg.sender, replies::GENERIC_ERROR).await {
                tracing::error!(sender = %msg.sender, error = %e, "could not deliver the apology");
            }
        }

        drop(guard);
        drop(lock);
        // Uncontended entries are dropped so the map stays bounded by the
        // number of senders currently in flight, not ever seen. A handler
        // waiting on the same sender still holds its own clone (strong
        // count > 1) and keeps the entry alive.
        self.locks
            .remove_if(&msg.sender, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Route to exactly one handler for the (state, input) pair.
    async fn dispatch(&self, msg: &ChannelMessage) -> Result<()> {
        let body = msg.body.trim();

        if let Some(session) = self.store.get(&msg.sender) {
            if session.sub_state == Some(SubState::AwaitingMapConfirm) {
                return self.handle_map_confirm(msg, &session).await;
            }
            return match session.state {
                FlowState::AwaitingMedicineName => self.handle_medicine_query(msg, body).await,
                FlowState::TourismMenu => self.handle_tourism_choice(msg, body).await,
            };
        }

        if GREETING.is_match(body) {
            return self.handle_greeting(msg).await;
        }

        match body {
            "1" => self.handle_medicine_prompt(msg).await,
            "2" => self.handle_tourism_menu(msg).await,
            "3" => self.handle_health_units(msg).await,
            "4" => self.handle_telecenters(msg).await,
            "5" => self.handle_security_units(msg).await,
            "6" => self.handle_medicine_by_neighborhood(msg).await,
            _ => {
                tracing::debug!(sender = %msg.sender, "message matched no trigger, ignoring");
                Ok(())
            }
        }
    }

    async fn typing(&self, to: &str) -> Result<()> {
        self.transport.send_typing(to).await?;
        if !self.typing_delay.is_zero() {
            tokio::time::sleep(self.typing_delay).await;
        }
        Ok(())
    }

    fn dataset(&self, path: &str) -> PathBuf {
        DatasetsConfig::resolve(path)
    }

    async fn handle_greeting(&self, msg: &ChannelMessage) -> Result<()> {
        self.typing(&msg.sender).await?;
        self.transport
            .send_text(&msg.sender, &replies::welcome(msg.first_name()))
            .await?;
        self.store.clear(&msg.sender);
        Ok(())
    }

    async fn handle_medicine_prompt(&self, msg: &ChannelMessage) -> Result<()> {
        self.typing(&msg.sender).await?;
        self.transport
            .send_text(&msg.sender, replies::MEDICINE_PROMPT)
            .await?;
        self.store
            .set(&msg.sender, FlowState::AwaitingMedicineName, None);
        Ok(())
    }

    /// Free text while awaiting a medicine name: run the stock query.
    async fn handle_medicine_query(&self, msg: &ChannelMessage, name: &str) -> Result<()> {
        // "1" re-enters the prompt instead of being queried as a name.
        if name == "1" {
            return self.handle_medicine_prompt(msg).await;
        }

        self.typing(&msg.sender).await?;
        let rows = filter_by(&self.dataset(&self.datasets.medicines), "medicamento", name)?;

        if rows.is_empty() {
            self.transport
                .send_text(&msg.sender, &replies::medicine_not_found(name))
                .await?;
            self.store.clear(&msg.sender);
            return Ok(());
        }

        self.transport
            .send_text(&msg.sender, &replies::medicine_results(&rows))
            .await?;
        self.transport
            .send_text(&msg.sender, replies::MAP_OFFER)
            .await?;

        let mut extra = HashMap::new();
        extra.insert(EXTRA_MEDICINE.to_string(), name.to_string());
        self.store.set_with_extra(
            &msg.sender,
            FlowState::AwaitingMedicineName,
            Some(SubState::AwaitingMapConfirm),
            extra,
        );
        Ok(())
    }

    async fn handle_tourism_menu(&self, msg: &ChannelMessage) -> Result<()> {
        self.typing(&msg.sender).await?;
        self.transport
            .send_text(&msg.sender, replies::TOURISM_MENU)
            .await?;
        self.store.set(&msg.sender, FlowState::TourismMenu, None);
        Ok(())
    }

    async fn handle_tourism_choice(&self, msg: &ChannelMessage, choice: &str) -> Result<()> {
        match choice {
            "1" => {
                self.typing(&msg.sender).await?;
                let drawn = sample(&self.dataset(&self.datasets.theatres), THEATRE_SAMPLE)?;
                if drawn.is_empty() {
                    self.transport
                        .send_text(&msg.sender, replies::THEATRES_EMPTY)
                        .await?;
                    self.store.clear(&msg.sender);
                    return Ok(());
                }

                self.transport
                    .send_text(&msg.sender, &replies::theatre_list(&drawn))
                    .await?;
                self.transport
                    .send_text(&msg.sender, replies::MAP_OFFER)
                    .await?;
                self.store.set(
                    &msg.sender,
                    FlowState::TourismMenu,
                    Some(SubState::AwaitingMapConfirm),
                );
                Ok(())
            }
            "2" => {
                self.typing(&msg.sender).await?;
                self.transport
                    .send_text(&msg.sender, replies::RESTAURANT_STUB)
                    .await?;
                self.store.clear(&msg.sender);
                Ok(())
            }
            _ => {
                // Invalid option: re-prompt and keep the session so the
                // sender can retry.
                self.typing(&msg.sender).await?;
                self.transport
                    .send_text(&msg.sender, replies::TOURISM_INVALID)
                    .await
            }
        }
    }

    /// sim/não while a map was offered.
    async fn handle_map_confirm(&self, msg: &ChannelMessage, session: &Session) -> Result<()> {
        match msg.body.trim().to_lowercase().as_str() {
            "sim" => {
                self.typing(&msg.sender).await?;
                let address = self.resolve_map_address(session)?;
                match address {
                    Some(address) => {
                        let png = self.renderer.render(self.marker.0, self.marker.1).await?;
                        self.transport
                            .send_image(&msg.sender, png, &replies::map_caption(&address))
                            .await?;
                    }
                    None => {
                        self.transport
                            .send_text(&msg.sender, replies::MAP_NO_ADDRESS)
                            .await?;
                    }
                }
                self.store.clear(&msg.sender);
                Ok(())
            }
            "não" | "nao" => {
                self.transport
                    .send_text(&msg.sender, replies::FAREWELL)
                    .await?;
                self.store.clear(&msg.sender);
                Ok(())
            }
            _ => {
                // Anything else re-prompts without clearing the session.
                self.transport
                    .send_text(&msg.sender, replies::MAP_CONFIRM_REPROMPT)
                    .await
            }
        }
    }

    /// Re-resolve the address the map should point at for the session's
    /// flow: first stock match for medicine, one sampled theatre for
    /// tourism.
    fn resolve_map_address(&self, session: &Session) -> Result<Option<String>> {
        match session.state {
            FlowState::AwaitingMedicineName => {
                let name = session
                    .extra
                    .get(EXTRA_MEDICINE)
                    .map(String::as_str)
                    .unwrap_or_default();
                let rows =
                    filter_by(&self.dataset(&self.datasets.medicines), "medicamento", name)?;
                Ok(rows
                    .first()
                    .and_then(|row| row.get("endereco"))
                    .filter(|a| !a.is_empty())
                    .map(str::to_string))
            }
            FlowState::TourismMenu => {
                let drawn = sample(&self.dataset(&self.datasets.theatres), 1)?;
                Ok(drawn.first().map(|theatre| {
                    format!(
                        "{}, {}",
                        theatre.get_or_unspecified("logradouro"),
                        theatre.get_or_unspecified("bairro"),
                    )
                }))
            }
        }
    }

    async fn handle_health_units(&self, msg: &ChannelMessage) -> Result<()> {
        self.listing(
            msg,
            &self.datasets.health_units,
            "Lista de Unidades de Saúde:",
            "Nenhuma unidade de saúde encontrada na base de dados.",
            "unidades encontradas",
            |index, row: &Row| {
                format!(
                    "\n{index}. Posto de Saude: {}\n   Endereço: {}\n",
                    row.get_or_unspecified("nome_oficial"),
                    row.get_or_unspecified("endereço"),
                )
            },
        )
        .await
    }

    async fn handle_telecenters(&self, msg: &ChannelMessage) -> Result<()> {
        self.listing(
            msg,
            &self.datasets.telecenters,
            "Lista de Telecentros:",
            "Nenhum telecentro encontrado na base de dados.",
            "telecentros encontrados",
            |index, row: &Row| {
                format!(
                    "\n{index}. Telecentro: {}\n   Endereço: {}\n",
                    row.get_or_unspecified("Telecentro"),
                    row.get_or_unspecified("endereço"),
                )
            },
        )
        .await
    }

    async fn handle_security_units(&self, msg: &ChannelMessage) -> Result<()> {
        self.listing(
            msg,
            &self.datasets.security_units,
            "Lista de Unidades de Segurança:",
            "Nenhuma unidade de segurança encontrada na base de dados.",
            "unidades encontradas",
            |index, row: &Row| {
                format!(
                    "\n{index}. Posto de Segurança: {}\n   Endereço: {}\n",
                    row.get_or_unspecified("equipamento"),
                    row.get_or_unspecified("endereço"),
                )
            },
        )
        .await
    }

    async fn handle_medicine_by_neighborhood(&self, msg: &ChannelMessage) -> Result<()> {
        self.listing(
            msg,
            &self.datasets.medicine_by_neighborhood,
            "Lista de Medicamentos por Bairro:",
            "Nenhum medicamento encontrado na base de dados.",
            "registros encontrados",
            |index, row: &Row| {
                format!(
                    "\n{index}. Bairro: {}\n   Unidade de Saúde: {}\n   Medicamento: {}\n   Apresentação: {}\n   Estoque: {}\n",
                    row.get_or_unspecified("BAIRRO"),
                    row.get_or_unspecified("UNIDADE DE SAÚDE"),
                    row.get_or_unspecified("MEDICAMENTO"),
                    row.get_or_unspecified("APRESENTAÇÃO"),
                    row.get_or_unspecified("ESTOQUE"),
                )
            },
        )
        .await
    }

    /// Shared shape of the four "list everything" commands.
    async fn listing<F>(
        &self,
        msg: &ChannelMessage,
        dataset: &str,
        title: &str,
        empty_reply: &str,
        noun: &str,
        format_row: F,
    ) -> Result<()>
    where
        F: Fn(usize, &Row) -> String,
    {
        self.typing(&msg.sender).await?;
        let rows = all_rows(&self.dataset(dataset))?;

        let reply = if rows.is_empty() {
            empty_reply.to_string()
        } else {
            replies::capped_listing(title, &rows, noun, format_row)
        };
        self.transport.send_text(&msg.sender, &reply).await?;
        self.store.clear(&msg.sender);
        Ok(())
    }
}

/// Consume the inbound queue, handling each message on its own task.
pub fn spawn_router_loop(
    router: Arc<Router>,
    mut rx: mpsc::Receiver<ChannelMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router.handle(&msg).await;
            });
        }
        tracing::info!("inbound queue closed, router loop exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::OutgoingContent;
    use crate::config::MapConfig;
    use async_trait::async_trait;
    use std::io::Write;
    use tempfile::TempDir;

    /// Transport fake recording every outbound message.
    struct FakeTransport {
        sent: Mutex<Vec<(String, OutgoingContent)>>,
    }

    impl FakeTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        async fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .await
                .iter()
                .filter_map(|(_, content)| match content {
                    OutgoingContent::Text { text } => Some(text.clone()),
                    OutgoingContent::Image { .. } => None,
                })
                .collect()
        }

        async fn images(&self) -> Vec<(Vec<u8>, String)> {
            self.sent
                .lock()
                .await
                .iter()
                .filter_map(|(_, content)| match content {
                    OutgoingContent::Image { data, caption } => {
                        Some((data.clone(), caption.clone()))
                    }
                    OutgoingContent::Text { .. } => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl ChatTransport for FakeTransport {
        async fn send_text(&self, to: &str, text: &str) -> Result<()> {
            self.sent.lock().await.push((
                to.to_string(),
                OutgoingContent::Text { text: text.to_string() },
            ));
            Ok(())
        }

        async fn send_image(&self, to: &str, data: Vec<u8>, caption: &str) -> Result<()> {
            self.sent.lock().await.push((
                to.to_string(),
                OutgoingContent::Image { data, caption: caption.to_string() },
            ));
            Ok(())
        }

        async fn send_typing(&self, _to: &str) -> Result<()> {
            Ok(())
        }
    }

    const SENDER: &str = "5581999999999@c.us";

    struct Harness {
        transport: Arc<FakeTransport>,
        store: Arc<SessionStore>,
        router: Router,
        _datasets: TempDir,
    }

    fn write_dataset(dir: &TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path.display().to_string()
    }

    fn harness_with(map: MapConfig) -> Harness {
        let dir = TempDir::new().unwrap();
        let mut config = BotConfig::default();
        config.gateway.typing_delay_ms = 0;
        config.map = map;
        config.datasets.medicines = write_dataset(
            &dir,
            "medicamentos.csv",
            "medicamento,endereco,dosagem\n\
             Dipirona Sódica,Rua do Sol 1,500mg\n\
             DIPIRONA GOTAS,Av. Recife 3,100mg/ml\n\
             Paracetamol,Rua da Aurora 2,750mg\n",
        );
        config.datasets.theatres = write_dataset(
            &dir,
            "teatros.csv",
            "nome,descricao,logradouro,bairro\n\
             Teatro Apolo,Palco histórico,Rua do Apolo 121,Recife Antigo\n\
             Teatro do Parque,Ao ar livre,Rua do Hospício 81,Boa Vista\n\
             Teatro Barreto Júnior,Espaço cultural,Rua Estudante Jeremias Bastos,Pina\n\
             Teatro Hermilo Borba Filho,Cênico,Cais do Apolo,Recife Antigo\n\
             Teatro Luiz Mendonça,No parque,Av. Boa Viagem,Boa Viagem\n\
             Teatro Marco Camarotti,Comunitário,Rua da Moeda,Santo Amaro\n",
        );
        let mut health = String::from("nome_oficial,endereço\n");
        for i in 0..25 {
            health.push_str(&format!("US {i} Casa Amarela,Av. Norte {i}\n"));
        }
        config.datasets.health_units = write_dataset(&dir, "unidades_saude.csv", &health);
        config.datasets.telecenters = write_dataset(
            &dir,
            "telecentros.csv",
            "Telecentro,endereço\nTelecentro Afogados,Rua X 1\n",
        );
        config.datasets.security_units = write_dataset(
            &dir,
            "unidades_seguranca.csv",
            "equipamento,endereço\nCompaz Eduardo Campos,Av. Caxangá 1\n",
        );
        config.datasets.medicine_by_neighborhood = write_dataset(
            &dir,
            "rel_medicamento_bairro.csv",
            "BAIRRO,UNIDADE DE SAÚDE,MEDICAMENTO,APRESENTAÇÃO,ESTOQUE\n\
             Casa Amarela,US 271,Dipirona,Comprimido 500mg,120\n",
        );

        let transport = FakeTransport::new();
        let store = Arc::new(SessionStore::new());
        let router = Router::new(transport.clone(), store.clone(), &config).unwrap();
        Harness {
            transport,
            store,
            router,
            _datasets: dir,
        }
    }

    fn harness() -> Harness {
        // Unroutable tile URL; tests that render maps override it.
        harness_with(MapConfig {
            tile_url: "http://127.0.0.1:1/{z}/{x}/{y}.png".into(),
            tile_timeout_secs: 1,
            ..MapConfig::default()
        })
    }

    fn message(body: &str) -> ChannelMessage {
        ChannelMessage {
            id: "1".into(),
            sender: SENDER.into(),
            push_name: Some("Tiago Junior".into()),
            body: body.into(),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn greeting_from_fresh_sender_gets_the_menu() {
        let h = harness();
        h.router.handle(&message("Oi")).await;

        let texts = h.transport.texts().await;
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Tiago"));
        assert!(texts[0].contains("1 - Medicamentos"));
        assert!(h.store.get(SENDER).is_none());
    }

    #[tokio::test]
    async fn medicine_flow_end_to_end() {
        let h = harness();

        h.router.handle(&message("Oi")).await;
        h.router.handle(&message("1")).await;
        assert_eq!(
            h.store.get(SENDER).unwrap().state,
            FlowState::AwaitingMedicineName
        );

        h.router.handle(&message("dipirona")).await;
        let texts = h.transport.texts().await;
        let results = &texts[2];
        assert!(results.contains("Dipirona Sódica"));
        assert!(results.contains("DIPIRONA GOTAS"));
        assert!(!results.contains("Paracetamol"));

        // The map offer leaves the confirmation sub-state pending.
        let session = h.store.get(SENDER).unwrap();
        assert_eq!(session.sub_state, Some(SubState::AwaitingMapConfirm));
        assert_eq!(
            session.extra.get(EXTRA_MEDICINE).map(String::as_str),
            Some("dipirona")
        );

        h.router.handle(&message("não")).await;
        assert_eq!(h.transport.texts().await.last().unwrap().as_str(), replies::FAREWELL);
        assert!(h.store.get(SENDER).is_none());
    }

    #[tokio::test]
    async fn unknown_medicine_clears_the_session() {
        let h = harness();
        h.router.handle(&message("1")).await;
        h.router.handle(&message("xarope de guabiraba")).await;

        let texts = h.transport.texts().await;
        assert!(texts
            .last()
            .unwrap()
            .contains("não encontramos o medicamento \"xarope de guabiraba\""));
        assert!(h.store.get(SENDER).is_none());
    }

    #[tokio::test]
    async fn one_while_awaiting_medicine_name_reprompts() {
        let h = harness();
        h.router.handle(&message("1")).await;
        h.router.handle(&message("1")).await;

        let texts = h.transport.texts().await;
        assert_eq!(texts[1], replies::MEDICINE_PROMPT);
        assert_eq!(
            h.store.get(SENDER).unwrap().state,
            FlowState::AwaitingMedicineName
        );
    }

    #[tokio::test]
    async fn tourism_theatre_draw_lists_five_distinct_entries() {
        let h = harness();
        h.router.handle(&message("2")).await;
        assert_eq!(h.store.get(SENDER).unwrap().state, FlowState::TourismMenu);

        h.router.handle(&message("1")).await;
        let texts = h.transport.texts().await;
        let listing = &texts[1];
        assert!(listing.contains("5 teatros sorteados"));
        assert_eq!(listing.matches("Teatro ").count(), 5);

        let session = h.store.get(SENDER).unwrap();
        assert_eq!(session.sub_state, Some(SubState::AwaitingMapConfirm));
    }

    #[tokio::test]
    async fn tourism_invalid_option_keeps_the_session_for_retry() {
        let h = harness();
        h.router.handle(&message("2")).await;
        h.router.handle(&message("9")).await;

        assert_eq!(
            h.transport.texts().await.last().unwrap().as_str(),
            replies::TOURISM_INVALID
        );
        let session = h.store.get(SENDER).unwrap();
        assert_eq!(session.state, FlowState::TourismMenu);
        assert_eq!(session.sub_state, None);

        // Retry with the restaurant stub: handled and cleared.
        h.router.handle(&message("2")).await;
        assert_eq!(
            h.transport.texts().await.last().unwrap().as_str(),
            replies::RESTAURANT_STUB
        );
        assert!(h.store.get(SENDER).is_none());
    }

    #[tokio::test]
    async fn map_confirm_reprompts_without_clearing_on_other_input() {
        let h = harness();
        h.router.handle(&message("1")).await;
        h.router.handle(&message("dipirona")).await;

        h.router.handle(&message("talvez")).await;
        assert_eq!(
            h.transport.texts().await.last().unwrap().as_str(),
            replies::MAP_CONFIRM_REPROMPT
        );
        assert_eq!(
            h.store.get(SENDER).unwrap().sub_state,
            Some(SubState::AwaitingMapConfirm)
        );
    }

    /// Tile server answering every GET with one green 256x256 PNG.
    async fn tile_server() -> wiremock::MockServer {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let img = image::RgbaImage::from_pixel(256, 256, image::Rgba([0, 90, 0, 255]));
        let mut tile = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut tile), image::ImageFormat::Png)
            .unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tile))
            .mount(&server)
            .await;
        server
    }

    fn map_config_for(server: &wiremock::MockServer) -> MapConfig {
        MapConfig {
            tile_url: format!("{}/{{z}}/{{x}}/{{y}}.png", server.uri()),
            ..MapConfig::default()
        }
    }

    #[tokio::test]
    async fn affirmative_map_confirm_sends_the_rendered_image() {
        let server = tile_server().await;
        let h = harness_with(map_config_for(&server));

        h.router.handle(&message("1")).await;
        h.router.handle(&message("dipirona")).await;
        h.router.handle(&message("sim")).await;

        let images = h.transport.images().await;
        assert_eq!(images.len(), 1);
        let (png, caption) = &images[0];
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(caption.as_str(), "Mapa para Rua do Sol 1");
        assert!(h.store.get(SENDER).is_none());
    }

    #[tokio::test]
    async fn tourism_map_confirm_sends_a_theatre_map() {
        let server = tile_server().await;
        let h = harness_with(map_config_for(&server));

        h.router.handle(&message("2")).await;
        h.router.handle(&message("1")).await;
        h.router.handle(&message("sim")).await;

        let images = h.transport.images().await;
        assert_eq!(images.len(), 1);
        let (png, caption) = &images[0];
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        // "logradouro, bairro" of whichever theatre was drawn.
        assert!(caption.starts_with("Mapa para "));
        assert!(caption.contains(", "));
        assert!(h.store.get(SENDER).is_none());
    }

    #[tokio::test]
    async fn tourism_map_confirm_without_address_sends_the_fallback_text() {
        let h = harness();
        h.router.handle(&message("2")).await;
        h.router.handle(&message("1")).await;

        // Theatres gone by the time the map is confirmed: no address to
        // point at, so no render is attempted.
        std::fs::write(
            h.router.dataset(&h.router.datasets.theatres),
            "nome,descricao,logradouro,bairro\n",
        )
        .unwrap();
        h.router.handle(&message("sim")).await;

        assert_eq!(
            h.transport.texts().await.last().unwrap().as_str(),
            replies::MAP_NO_ADDRESS
        );
        assert!(h.transport.images().await.is_empty());
        assert!(h.store.get(SENDER).is_none());
    }

    #[tokio::test]
    async fn per_sender_lock_entries_do_not_accumulate() {
        let h = harness();
        for sender in ["a@c.us", "b@c.us", "c@c.us"] {
            let mut msg = message("Oi");
            msg.sender = sender.into();
            h.router.handle(&msg).await;
        }
        assert!(h.router.locks.is_empty());

        // A full flow releases its entry too.
        h.router.handle(&message("1")).await;
        h.router.handle(&message("dipirona")).await;
        h.router.handle(&message("não")).await;
        assert!(h.router.locks.is_empty());
    }

    #[tokio::test]
    async fn listings_cap_at_twenty_rows() {
        let h = harness();
        h.router.handle(&message("3")).await;

        let texts = h.transport.texts().await;
        let listing = &texts[0];
        assert_eq!(listing.matches("Posto de Saude:").count(), 20);
        assert!(listing.contains("Mostrando apenas os primeiros 20 de 25 unidades encontradas."));
        assert!(h.store.get(SENDER).is_none());
    }

    #[tokio::test]
    async fn short_listings_have_no_truncation_notice() {
        let h = harness();
        h.router.handle(&message("5")).await;

        let texts = h.transport.texts().await;
        assert!(texts[0].contains("Compaz Eduardo Campos"));
        assert!(!texts[0].contains("Mostrando"));
    }

    #[tokio::test]
    async fn medicine_by_neighborhood_lists_every_column() {
        let h = harness();
        h.router.handle(&message("6")).await;

        let texts = h.transport.texts().await;
        let listing = &texts[0];
        assert!(listing.contains("Bairro: Casa Amarela"));
        assert!(listing.contains("Unidade de Saúde: US 271"));
        assert!(listing.contains("Apresentação: Comprimido 500mg"));
        assert!(listing.contains("Estoque: 120"));
    }

    #[tokio::test]
    async fn unmatched_text_without_session_is_ignored() {
        let h = harness();
        h.router.handle(&message("qwerty")).await;
        assert!(h.transport.texts().await.is_empty());
        assert!(h.store.get(SENDER).is_none());
    }

    #[tokio::test]
    async fn dataset_failure_sends_the_apology_and_clears() {
        let h = harness();
        h.router.handle(&message("1")).await;

        // Break the dataset after the flow started.
        std::fs::remove_file(h.router.dataset(&h.router.datasets.medicines)).unwrap();
        h.router.handle(&message("dipirona")).await;

        assert_eq!(
            h.transport.texts().await.last().unwrap().as_str(),
            replies::GENERIC_ERROR
        );
        assert!(h.store.get(SENDER).is_none());
    }
}
