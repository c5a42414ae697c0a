//! Prompt templates for the report generation steps

use crate::providers::SimilarCase;

/// Inputs for the base-fields prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct BasePromptInput<'a> {
    pub template_excerpt: &'a str,
    pub corpus: &'a str,
    pub notes: &'a str,
    pub reference_style_text: &'a str,
    pub similar_cases: &'a [SimilarCase],
    pub image_tokens: &'a [String],
    pub allow_vision: bool,
}

/// Prompt builder for the generation pipeline
pub struct PromptBuilder;

impl PromptBuilder {
    /// Format similar cases as `[title]  \nsnippet` blocks separated by `---`
    pub fn format_similar_cases(cases: &[SimilarCase]) -> String {
        cases
            .iter()
            .map(|c| format!("[{}]  \n{}", c.title, c.content_snippet))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    /// Prompt asking for every template field as one flat JSON object
    pub fn build_base_prompt(input: &BasePromptInput<'_>) -> String {
        let style_block = if input.reference_style_text.is_empty() {
            String::new()
        } else {
            format!(
                "\n\nESEMPIO DI FORMATTAZIONE (SOLO PER TONO E STILE; IGNORA CONTENUTO):\n<<<\n{}\n>>>",
                input.reference_style_text
            )
        };

        let image_block = if input.allow_vision && !input.image_tokens.is_empty() {
            format!("\n\nFOTO_DANNI_BASE64:\n{}", input.image_tokens.join("\n"))
        } else {
            String::new()
        };

        let cases_block = if input.similar_cases.is_empty() {
            String::new()
        } else {
            format!(
                "\n\nCASI_SIMILI (usa solo come riferimento stilistico e per informazioni quali indirizzi, cause):\n<<<\n{}\n>>>",
                Self::format_similar_cases(input.similar_cases)
            )
        };

        format!(
            r#"Sei un perito assicurativo italiano della Salomone e Associati, abituato a scrivere perizie tecniche più lunghe e dettagliate possibili, ai clienti piace così.
Analizza i documenti e restituisci ESCLUSIVAMENTE un JSON valido, senza testo extra, con le chiavi qui sotto.

## Definizione chiavi
| chiave JSON       | tag DOCX                | contenuto richiesto                                   |
|-------------------|-------------------------|-------------------------------------------------------|
| client            | CLIENT                  | Ragione sociale cliente                               |
| client_address1   | CLIENTADDRESS1          | Via/Piazza + numero indirizzo cliente                 |
| client_address2   | CLIENTADDRESS2          | CAP + città cliente                                   |
| date              | DATE                    | Data di oggi (GG/MM/AAAA)                             |
| vs_rif            | VSRIF                   | Riferimento del sinistro (del cliente)                |
| rif_broker        | RIFBROKER               | Riferimento del sinistro (del broker)                 |
| polizza           | POLIZZA                 | Numero polizza assicurativa                           |
| ns_rif            | NSRIF                   | Riferimento del sinistro (interno, perito della Salomone e Associati) |
| assicurato        | ASSICURATO              | Ragione sociale dell'assicurato                       |
| indirizzo_ass1    | INDIRIZZOASSICURATO1    | Via/Piazza dell'indirizzo dell'assicurato             |
| indirizzo_ass2    | INDIRIZZOASSICURATO2    | CAP + città dell'indirizzo dell'assicurato            |
| luogo             | LUOGO                   | Luogo in cui è accaduto il sinistro                   |
| data_danno        | DATADANNO               | Data del sinistro                                     |
| cause             | CAUSE                   | Causa presunta del sinistro (oggetto di perizia)      |
| data_incarico     | DATAINCARICO            | Data in cui è stato incaricato il perito dal cliente  |
| merce             | MERCE                   | Tipo merce sinistrata                                 |
| peso_merce        | PESOMERCE               | Peso complessivo in kg della merce sinistrata         |
| valore_merce      | VALOREMERCE             | Valore in € della merce sinistrata                    |
| data_intervento   | DATAINTERVENTO          | Data del sopralluogo sul luogo del sinistro da parte del perito |
| dinamica_eventi   | DINAMICA_EVENTI         | Sez. 2a: descrivi **solo** la dinamica del sinistro, chi, come, dove, quando, perché è avvenuto, **senza titolo** |
| accertamenti      | ACCERTAMENTI            | Sez. 2b: accertamenti peritali eseguiti, dove, quando, come, con chi, le scoperte peritali, **senza titolo** |
| quantificazione   | QUANTIFICAZIONE         | Sez. 3: quantificazione del danno totale, cifre come lista puntata o tabella testo, **senza titolo** |
| commento          | COMMENTO                | Sez. 4: sintesi tecnica finale, come da esempio, **senza titolo** |
| allegati          | ALLEGATI                | Elenco allegati uno sopra l'altro, ovvero i tipi di documenti caricati per la nuova perizia ("Nolo; Fattura; Bolla; Foto 1; Foto 2 ...") |

Se un valore non è rintracciabile, restituisci null.

## Formato di output (rispettare ordine e maiusc/minusc delle chiavi)
{{
  "client": "",
  "client_address1": "",
  "client_address2": "",
  "date": "",
  "vs_rif": "",
  "rif_broker": "",
  "polizza": "",
  "ns_rif": "",
  "assicurato": "",
  "indirizzo_ass1": "",
  "indirizzo_ass2": "",
  "luogo": "",
  "data_danno": "",
  "cause": "",
  "data_incarico": "",
  "merce": "",
  "peso_merce": "",
  "valore_merce": "",
  "data_intervento": "",
  "dinamica_eventi": "",
  "accertamenti": "",
  "quantificazione": "",
  "commento": "",
  "allegati": ""
}}

Regole:
1. NIENTE markdown fuori dai campi specificati, html o commenti: solo JSON puro.
2. Scarta testo ridondante; mantieni numerazione, elenchi puntati e grassetti in **asterischi** se servono.
3. Non aggiungere campi extra. Non cambiare i nomi chiave.
4. Se presenti, analizza con occhio peritale le immagini nel blocco FOTO_DANNI_BASE64 e integra la causa probabile dei danni.
5. Per le chiavi "dinamica_eventi", "accertamenti", "quantificazione", "commento" scrivi solo il contenuto (i titoli sono già nel template).
   Ognuna di queste 4 sezioni deve contenere almeno 200 parole.
6. Separa tutti i paragrafi con UNA riga bianca (\n\n).

RISPOSTA OBBLIGATORIA:
Restituisci SOLO il JSON, senza testo extra prima o dopo.

## Template di riferimento (tono & terminologia):
<<<
{template_excerpt}
>>>{style_block}

## Documentazione utente:
<<<
{corpus}
>>>

## Note extra:
{notes}{image_block}{cases_block}
"#,
            template_excerpt = input.template_excerpt,
            style_block = style_block,
            corpus = input.corpus,
            notes = input.notes,
            image_block = image_block,
            cases_block = cases_block,
        )
    }

    /// Prompt asking for a JSON array of `{section, title, bullets}` items
    pub fn build_outline_prompt(template_excerpt: &str, corpus: &str, notes: &str, similar_cases: &str) -> String {
        format!(
            r#"Sei un perito assicurativo italiano. Prepara la scaletta della perizia.

Restituisci SOLO un array JSON. Ogni elemento ha la forma:
{{"section": "<chiave>", "title": "<titolo>", "bullets": ["<punto>", "..."]}}

Le chiavi ammesse per "section" sono, in quest'ordine:
"dinamica_eventi", "accertamenti", "quantificazione", "commento".

## TEMPLATE:
<<<
{template_excerpt}
>>>

## DOCUMENTAZIONE:
<<<
{corpus}
>>>

## CASI_SIMILI:
<<<
{similar_cases}
>>>

## NOTE:
{notes}
"#
        )
    }

    /// Prompt asking for `{"<section key>": "<content>"}`
    #[allow(clippy::too_many_arguments)]
    pub fn build_expand_section_prompt(
        title: &str,
        section_key: &str,
        bullets: &[String],
        section_question: &str,
        corpus: &str,
        template_excerpt: &str,
        notes: &str,
        reference_style_text: &str,
    ) -> String {
        let bullets = bullets
            .iter()
            .map(|b| format!("- {}", b))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Sei un perito assicurativo italiano. Scrivi la sezione "{title}" della perizia.

Domanda guida: {section_question}

Punti da coprire:
{bullets}

Restituisci SOLO un oggetto JSON con un'unica chiave:
{{"{section_key}": "<testo della sezione>"}}
Separa i paragrafi con una riga bianca (\n\n). Non ripetere il titolo.

## TEMPLATE:
<<<
{template_excerpt}
>>>

## ESEMPIO DI STILE:
<<<
{reference_style_text}
>>>

## DOCUMENTAZIONE:
<<<
{corpus}
>>>

## NOTE:
{notes}
"#
        )
    }

    /// Prompt asking to rewrite all sections with one consistent tone
    pub fn build_harmonize_prompt(sections_json: &str, reference_style_text: &str) -> String {
        let style = if reference_style_text.trim().is_empty() {
            "(Nessun esempio di stile fornito)"
        } else {
            reference_style_text
        };

        format!(
            r#"Sei un perito assicurativo italiano. Armonizza tono, terminologia e stile delle sezioni seguenti
senza cambiarne i fatti. Elimina ripetizioni tra sezioni.

Restituisci SOLO un oggetto JSON con esattamente le stesse chiavi dell'input.

## SEZIONI:
{sections_json}

## ESEMPIO DI STILE:
<<<
{style}
>>>
"#
        )
    }
}
